//! Virtual MMT-TG sound module: a sparse shadow of the device's native
//! parameter memory, updated from SysEx messages so that parameter state can
//! be re-expressed as plain control/program changes.

pub mod parameter_table;

use log::warn;

use crate::dtype::OkdError;

pub use parameter_table::{MultiPartEntry, System};

const NATIVE_PARAMETER_MEMORY_SIZE: usize = 0x20_0000;
const MULTI_PART_BASE_ADDRESS: usize = 0x008000;

pub struct MmtTg {
    pub sound_module_mode: u8,
    native_parameter_memory: Vec<u8>,
}

impl Default for MmtTg {
    fn default() -> Self {
        MmtTg::new()
    }
}

impl MmtTg {
    pub const PARTS_PER_PORT: usize = 16;
    pub const PORTS: usize = 2;
    pub const PARTS: usize = MmtTg::PARTS_PER_PORT * MmtTg::PORTS;

    pub fn new() -> MmtTg {
        let mut device = MmtTg {
            sound_module_mode: 0x00,
            native_parameter_memory: Vec::new(),
        };
        device.initialize_state();
        device
    }

    pub fn initialize_state(&mut self) {
        self.sound_module_mode = 0x00;
        self.native_parameter_memory = vec![0x00; NATIVE_PARAMETER_MEMORY_SIZE];

        // Power-on defaults of the 32 multi part entries. The rcv_* switches
        // sit at 0x01, not 0x7F.
        for entry_index in 0..0x20usize {
            let entry_address = MULTI_PART_BASE_ADDRESS + (entry_index << 7);
            let memory = &mut self.native_parameter_memory;

            memory[entry_address + 0x04] = entry_index as u8;
            for offset in 0x05..=0x18 {
                memory[entry_address + offset] = 0x01;
            }
            memory[entry_address + 0x19] = 0x08;
            memory[entry_address + 0x1B] = 0x64;
            memory[entry_address + 0x1C] = 0x40;
            memory[entry_address + 0x1D] = 0x40;
            memory[entry_address + 0x1E] = 0x40;
            memory[entry_address + 0x20] = 0x7F;
            memory[entry_address + 0x21] = 0x10;
            memory[entry_address + 0x22] = 0x11;
            memory[entry_address + 0x23] = 0x7F;
            memory[entry_address + 0x25] = 0x40;
            for offset in 0x27..=0x3D {
                memory[entry_address + offset] = 0x40;
            }
            memory[entry_address + 0x3E] = 0x0A;
            memory[entry_address + 0x41] = 0x42;
            memory[entry_address + 0x42] = 0x40;
            memory[entry_address + 0x43] = 0x40;
            for offset in [0x47, 0x48, 0x49, 0x4D, 0x4E, 0x4F, 0x53, 0x54, 0x55, 0x59, 0x5A, 0x5B]
            {
                memory[entry_address + offset] = 0x40;
            }
        }
    }

    fn is_sysex_message(data_bytes: &[u8]) -> bool {
        data_bytes.len() >= 2 && data_bytes[data_bytes.len() - 1] == 0xF7
    }

    fn is_native_parameter_change_message(data_bytes: &[u8]) -> bool {
        MmtTg::is_sysex_message(data_bytes) && data_bytes.len() >= 9 && data_bytes[0] == 0x43
    }

    /// The multi part a native parameter change writes into, if any.
    pub fn effecting_multi_part_number(data_bytes: &[u8]) -> Option<u8> {
        if !MmtTg::is_native_parameter_change_message(data_bytes) {
            return None;
        }
        if data_bytes[3] != 0x02 {
            return None;
        }
        MultiPartEntry::ENTRY_INDEX_TO_PART_NUMBER_TABLE
            .get(data_bytes[4] as usize)
            .copied()
    }

    fn receive_universal_realtime_message(&mut self, data_bytes: &[u8]) {
        if data_bytes.len() < 7 {
            warn!("Short Universal Real Time message.");
            return;
        }
        let sub_id_1 = data_bytes[2];
        if sub_id_1 != 0x04 {
            warn!("Unknown sub_id_1 detected. sub_id_1={sub_id_1:#04X}");
        }

        let sub_id_2 = data_bytes[3];
        if sub_id_2 == 0x01 {
            // Master Volume
            let volume_msb = data_bytes[5];
            self.native_parameter_memory[0x000004] = volume_msb;
        } else if sub_id_2 == 0x02 {
            // Master Balance
            let balance_msb = data_bytes[5];
            self.native_parameter_memory[0x000006] = balance_msb;
        } else {
            warn!("Unknown sub_id_2 detected. sub_id_2={sub_id_2:#04X}");
        }
    }

    fn receive_universal_non_realtime_message(&mut self, data_bytes: &[u8]) {
        if data_bytes.len() < 5 {
            warn!("Short Universal Non Real Time message.");
            return;
        }
        let sub_id_1 = data_bytes[2];
        if sub_id_1 != 0x09 {
            warn!("Unknown sub_id_1 detected. sub_id_1={sub_id_1:#04X}");
        }

        let sub_id_2 = data_bytes[3];
        if sub_id_2 == 0x01 {
            self.sound_module_mode = data_bytes[4];
        } else {
            warn!("Unknown sub_id_2 detected. sub_id_2={sub_id_2:#04X}");
        }
    }

    fn receive_native_parameter_change_message(
        &mut self,
        data_bytes: &[u8],
    ) -> Result<(), OkdError> {
        if data_bytes.len() < 9 {
            return Err(OkdError::ShortRead);
        }
        let device_number_byte = data_bytes[1];
        if device_number_byte & 0xF0 != 0x10 {
            return Err(OkdError::BadStatusByte {
                byte: device_number_byte,
                expected: "device number",
            });
        }

        let address = ((data_bytes[3] as usize) << 14)
            | ((data_bytes[4] as usize) << 7)
            | data_bytes[5] as usize;
        let data_length = data_bytes.len() - 8;
        let data = &data_bytes[6..6 + data_length];

        if address == 0x00007F {
            // All Parameters Reset
            self.initialize_state();
            return Ok(());
        }
        if address + data.len() > self.native_parameter_memory.len() {
            warn!("Native parameter write past memory end. address={address:#08X}");
            return Ok(());
        }
        self.native_parameter_memory[address..address + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Route one SysEx message (data bytes after the `0xF0`, terminator
    /// included) into the parameter shadow.
    pub fn receive_sysex_message(&mut self, data_bytes: &[u8]) -> Result<(), OkdError> {
        if data_bytes.is_empty() {
            return Err(OkdError::ShortRead);
        }
        let end_mark = data_bytes[data_bytes.len() - 1];
        if end_mark != 0xF7 {
            return Err(OkdError::UnterminatedSysEx(end_mark));
        }

        let manufacture_id = data_bytes[0];
        match manufacture_id {
            0x7F => self.receive_universal_realtime_message(data_bytes),
            0x7E => self.receive_universal_non_realtime_message(data_bytes),
            0x43 => return self.receive_native_parameter_change_message(data_bytes),
            _ => {
                warn!("Unknown manufacture_id detected. manufacture_id={manufacture_id:#04X}");
            }
        }
        Ok(())
    }

    pub fn system(&self) -> System {
        System::from_memory(&self.native_parameter_memory)
    }

    pub fn multi_part_entry(&self, part_number: usize) -> MultiPartEntry {
        MultiPartEntry::from_memory(&self.native_parameter_memory, part_number)
    }

    pub fn multi_part_entries(&self) -> Vec<MultiPartEntry> {
        (0..MmtTg::PARTS)
            .map(|part_number| self.multi_part_entry(part_number))
            .collect()
    }
}
