/// Example: okd_tool dump "./discs/*.okd" -o dump
/// Example: okd_tool okd-to-midi song.okd song.mid
/// Example: okd_tool midi-to-okd song.mid playing.okd p3.okd --scramble
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::{command, Parser, Subcommand};
use colored::Colorize;

use okd::fileutils::{
    get_final_output_folder, get_input_output_pairs, open_file_overwrite_rw, VERSION,
};
use okd::okd::chunks::{MTrackInterpretation, OkdChunk};
use okd::okd::conversion::{midi_to_okds, okd_to_midi};
use okd::okd::{OkdFile, OkdHeader};

#[derive(Parser)]
#[command(author, version = VERSION, about = "Tools for working with DAM OKD karaoke files", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the chunks of OKD files as JSON and raw binaries
    Dump {
        /// Sets the path of the OKD files to be dumped
        #[arg(value_name = "INPUT")]
        input_glob: String,

        /// Sets the folder to output the dumped chunks
        #[arg(short = 'o', long, value_name = "OUTPUT")]
        output_folder: Option<PathBuf>,
    },
    /// Convert an OKD to a Standard MIDI File
    OkdToMidi {
        #[arg(value_name = "OKD")]
        okd_path: PathBuf,

        #[arg(value_name = "MIDI")]
        midi_path: PathBuf,

        /// Keep SysEx messages as raw events instead of text metas
        #[arg(long)]
        raw_sysex: bool,
    },
    /// Convert a Standard MIDI File to a playing OKD and a P3 OKD
    MidiToOkd {
        #[arg(value_name = "MIDI")]
        midi_path: PathBuf,

        #[arg(value_name = "PLAYING_OKD")]
        playing_okd_path: PathBuf,

        #[arg(value_name = "P3_OKD")]
        p3_okd_path: PathBuf,

        /// Scramble the output files
        #[arg(long)]
        scramble: bool,
    },
}

const DEFAULT_VERSION_STRING: &str = "YKS-1   v6.0v110";

fn dump_chunk(chunk: &OkdChunk, output_folder: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let id = chunk.id();
    let id_hex: String = id.iter().map(|byte| format!("{byte:02X}")).collect();

    match chunk {
        OkdChunk::Generic(generic) => {
            let mut output =
                open_file_overwrite_rw(output_folder.join(format!("chunk_0x{id_hex}.bin")))?;
            output.write_all(&generic.id)?;
            output.write_all(&generic.payload)?;
        }
        OkdChunk::MTrack(m_track) => {
            let interpretation = MTrackInterpretation::from_track(m_track);
            let mut output = open_file_overwrite_rw(
                output_folder.join(format!("m_track_{}.json", m_track.track_number())),
            )?;
            serde_json::to_writer_pretty(&mut output, m_track)?;
            let mut output = open_file_overwrite_rw(output_folder.join(format!(
                "m_track_interpretation_{}.json",
                m_track.track_number()
            )))?;
            write!(output, "{:#?}", interpretation)?;
        }
        OkdChunk::PTrack(p_track) => {
            let mut output = open_file_overwrite_rw(
                output_folder.join(format!("p_track_{}.json", p_track.track_number())),
            )?;
            serde_json::to_writer_pretty(&mut output, p_track)?;
        }
        OkdChunk::PTrackInfo(info) => {
            let mut output = open_file_overwrite_rw(output_folder.join("p_track_info.json"))?;
            serde_json::to_writer_pretty(&mut output, info)?;
        }
        OkdChunk::ExtendedPTrackInfo(info) => {
            let mut output =
                open_file_overwrite_rw(output_folder.join("extended_p_track_info.json"))?;
            serde_json::to_writer_pretty(&mut output, info)?;
        }
        OkdChunk::P3TrackInfo(info) => {
            let mut output = open_file_overwrite_rw(output_folder.join("p3_track_info.json"))?;
            serde_json::to_writer_pretty(&mut output, info)?;
        }
        OkdChunk::Adpcm(adpcm) => {
            for (i, samples) in adpcm.decode_tracks().iter().enumerate() {
                let mut output =
                    open_file_overwrite_rw(output_folder.join(format!("adpcm_{i}.pcm")))?;
                for sample in samples {
                    output.write_all(&sample.to_le_bytes())?;
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Dump {
            input_glob,
            output_folder,
        } => {
            let output_folder = get_final_output_folder(output_folder)?;
            for (input_path, _) in get_input_output_pairs(input_glob, "okd", &output_folder, "") {
                print!("Dumping {}... ", input_path.display());
                let mut input = File::open(&input_path)?;
                match OkdFile::read(&mut input) {
                    Ok(okd) => {
                        for chunk in &okd.chunks {
                            dump_chunk(chunk, &output_folder)?;
                        }
                        println!("{}", "ok".green());
                    }
                    Err(error) => {
                        println!("{}{}", "failed: ".red(), error);
                    }
                }
            }
        }
        Commands::OkdToMidi {
            okd_path,
            midi_path,
            raw_sysex,
        } => {
            let mut input = File::open(okd_path)?;
            let okd = OkdFile::read(&mut input)?;
            let midi_bytes = okd_to_midi(&okd, !raw_sysex)?;
            let mut output = open_file_overwrite_rw(midi_path)?;
            output.write_all(&midi_bytes)?;
            println!("{}", "done!".green());
        }
        Commands::MidiToOkd {
            midi_path,
            playing_okd_path,
            p3_okd_path,
            scramble,
        } => {
            let midi_bytes = std::fs::read(midi_path)?;
            let smf = midly::Smf::parse(&midi_bytes)?;
            let header = OkdHeader::new(DEFAULT_VERSION_STRING);
            let (mut playing_okd, mut p3_okd) = midi_to_okds(&smf, &header)?;
            let mut playing_file = open_file_overwrite_rw(playing_okd_path)?;
            playing_okd.write(&mut playing_file, *scramble)?;
            let mut p3_file = open_file_overwrite_rw(p3_okd_path)?;
            p3_okd.write(&mut p3_file, *scramble)?;
            println!("{}", "done!".green());
        }
    }

    Ok(())
}
