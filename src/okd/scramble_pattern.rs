/// XOR pattern table for OKD scrambling. 256 16-bit words, rotated through
/// by an 8-bit index; every consecutive pair forms a distinct 32-bit word,
/// which is what makes index detection from the magic bytes unambiguous.
pub const OKD_SCRAMBLE_PATTERN: [u16; 256] = [
    0x4ECF, 0x8E87, 0x7E18, 0x095A, 0x7619, 0xCD22, 0x7937, 0xC3E9,
    0xEB9B, 0x6393, 0xAD10, 0x1D4B, 0xE2F3, 0x724A, 0xA2B3, 0xB41B,
    0xF1A2, 0xF291, 0x5891, 0x54C8, 0x7DC0, 0xE984, 0x35CA, 0x044A,
    0xACFB, 0x0740, 0x554A, 0xB82D, 0x6DB5, 0x4737, 0x452C, 0x3BFD,
    0xC109, 0x58C3, 0xD568, 0xE796, 0x9250, 0x6D04, 0xF442, 0xEE25,
    0x1773, 0xA4A9, 0x1E8F, 0xB087, 0x9BA7, 0xC158, 0x96E4, 0x54CB,
    0x8AF0, 0xC1CE, 0x29EC, 0xC6E5, 0x1700, 0x8A40, 0xA527, 0xE077,
    0x9953, 0xFEAD, 0xF002, 0x05C1, 0xFFF5, 0xD176, 0x9069, 0x87B2,
    0x3E33, 0x2071, 0x6C9E, 0x7928, 0x088B, 0x9BB7, 0x325D, 0xE276,
    0x92B5, 0x73E3, 0x9487, 0xAD13, 0xFF41, 0xFC16, 0x5A91, 0xE1DF,
    0xE45F, 0x97E4, 0x1A75, 0xCCED, 0x7272, 0x891F, 0xF8CF, 0x4FAB,
    0x0A02, 0x9639, 0x6F09, 0x5A8C, 0xFBC0, 0x0A9D, 0x6CEB, 0x075C,
    0x705D, 0xE923, 0xC717, 0x2A56, 0xF485, 0x5AF4, 0xC918, 0x3DCB,
    0x45AB, 0xF340, 0x5F90, 0x2789, 0x8093, 0x7FE9, 0x6BF0, 0x73CA,
    0x6503, 0x5099, 0x6F51, 0x5851, 0x09E1, 0x8B98, 0x3F71, 0xF6EC,
    0xA3C1, 0x54D1, 0x447C, 0xBCA3, 0x1771, 0x0F84, 0x09B6, 0xBE42,
    0x3289, 0xB555, 0xAB27, 0x893A, 0x1322, 0x8F7E, 0x4B64, 0x5AB0,
    0x8BD1, 0x2E05, 0x1604, 0xB5BC, 0x7B64, 0xF254, 0x0834, 0x2A06,
    0x7FF9, 0x357C, 0x0DD9, 0xC6AE, 0xF8C3, 0xC1C5, 0x099B, 0xAFF2,
    0xBBAC, 0x0D76, 0x2014, 0x5F56, 0x6C17, 0xEBA0, 0x02F6, 0x3786,
    0x4D69, 0xCE12, 0x9848, 0xFB66, 0xCEE0, 0x614A, 0x5B01, 0x81F5,
    0x6E49, 0x891E, 0xF8B0, 0x969C, 0x39FB, 0x1E2E, 0xF9FE, 0x5367,
    0x98AB, 0x1B7C, 0xD29D, 0x397C, 0x307B, 0x5E1B, 0xF937, 0xC464,
    0xC6AA, 0x9B88, 0xB97A, 0x5D61, 0x9FCB, 0x8FF8, 0x34C7, 0xA0AF,
    0xD467, 0x78EC, 0x4F7E, 0xC3BF, 0xEB55, 0x6291, 0xCBCB, 0x2C59,
    0xC982, 0xAB07, 0x5E4B, 0xDBDF, 0xBDA1, 0x4611, 0xAC09, 0x99BB,
    0x1B13, 0x6B76, 0xF92F, 0x20F2, 0xA4FE, 0xE72A, 0x30EF, 0x5379,
    0xBA35, 0xD350, 0xB9EF, 0x2663, 0xBD49, 0x9A20, 0x874E, 0x4204,
    0x4C13, 0x144A, 0x0D97, 0xE2C5, 0x3045, 0x86DE, 0xEB95, 0xC997,
    0x0272, 0x4472, 0xFE41, 0x0BDE, 0xDDAD, 0x5FD1, 0x00C7, 0x3AEC,
    0x0CC0, 0x8289, 0xEE8A, 0x258E, 0x6E86, 0xAEC8, 0x180D, 0xB447,
    0x3B95, 0x130E, 0x0B73, 0x47FF, 0x8CE0, 0x080E, 0x38C7, 0x57B8,
];
