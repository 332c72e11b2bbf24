use std::{
    fs::{File, OpenOptions},
    io::Seek,
    path::{Path, PathBuf},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn open_file_overwrite_rw<P: AsRef<Path>>(path: P) -> Result<File, std::io::Error> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.seek(std::io::SeekFrom::Start(0))?;
    Ok(file)
}

pub fn valid_file_of_type<P: AsRef<Path>>(path: P, extension: &str) -> bool {
    let Ok(file_metadata) = std::fs::metadata(&path) else {
        return false;
    };
    let is_file = file_metadata.is_file();
    match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some(ext) => is_file && ext.to_lowercase() == extension.to_lowercase(),
        None => false,
    }
}

/// Expand an input glob into (input, output) path pairs, rewriting the
/// extension and redirecting into the output folder.
pub fn get_input_output_pairs(
    input_glob: &str,
    source_file_format: &str,
    output_folder: &Path,
    change_ext: &str,
) -> Vec<(PathBuf, PathBuf)> {
    glob::glob(input_glob)
        .expect("Failed to read glob pattern")
        .filter_map(|entry| match entry {
            Ok(path) => {
                if !valid_file_of_type(&path, source_file_format) {
                    println!("Skipping {}!", path.display());
                    return None;
                }
                let input_file_name = path.file_name()?;
                let mut output_path = output_folder.to_path_buf();
                output_path.push(input_file_name);
                output_path.set_extension(change_ext);
                Some((path, output_path))
            }
            Err(error) => {
                println!("{error:?}");
                None
            }
        })
        .collect()
}

pub fn get_final_output_folder(
    output_folder: &Option<PathBuf>,
) -> Result<PathBuf, std::io::Error> {
    match output_folder {
        Some(custom_output_folder) => {
            if std::fs::metadata(custom_output_folder)?.is_dir() {
                Ok(custom_output_folder.clone())
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "Output path must be a folder!",
                ))
            }
        }
        None => std::env::current_dir(),
    }
}
