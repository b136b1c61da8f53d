use std::{
    fs, io,
    path::{Path, PathBuf},
};

use miette::NamedSource;
use tracing::debug;

use crate::error::LoadError;
use crate::state::MEMORY_SIZE;

/// Where to find a program on disk.
#[derive(Clone, Debug)]
pub struct LoadConfig {
    /// Directory program names are resolved against.
    pub dir: PathBuf,
    /// Program file, relative to `dir`.
    pub name: Option<PathBuf>,
}

impl LoadConfig {
    pub fn new(dir: impl Into<PathBuf>, name: Option<impl AsRef<Path>>) -> Self {
        LoadConfig {
            dir: dir.into(),
            name: name.map(|name| name.as_ref().to_path_buf()),
        }
    }

    pub fn path(&self) -> Result<PathBuf, LoadError> {
        let name = self.name.as_ref().ok_or(LoadError::MissingArgument)?;
        Ok(self.dir.join(name))
    }
}

/// Read and parse the program named by `config`.
pub fn load_program(config: &LoadConfig) -> Result<Vec<u8>, LoadError> {
    let path = config.path()?;
    let src = fs::read_to_string(&path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound { path: path.clone() },
        _ => LoadError::Io {
            path: path.clone(),
            source: err,
        },
    })?;
    let program = parse_program(&path.display().to_string(), &src)?;
    debug!(path = %path.display(), bytes = program.len(), "program parsed");
    Ok(program)
}

/// Parse program text into bytes.
///
/// Every line is one of
/// - blank, or a comment starting with `#`: skipped
/// - up to 8 binary digits, optionally followed by `# comment`
pub fn parse_program(name: &str, src: &str) -> Result<Vec<u8>, LoadError> {
    let mut program = Vec::new();
    let mut line_start = 0;

    for (i, raw) in src.split_inclusive('\n').enumerate() {
        let offs = line_start;
        line_start += raw.len();

        let code = match raw.split_once('#') {
            Some((code, _comment)) => code,
            None => raw,
        };
        let trimmed = code.trim_start();
        let start = offs + (code.len() - trimmed.len());
        let text = trimmed.trim_end();
        if text.is_empty() {
            continue;
        }

        match parse_byte(text) {
            Some(byte) => program.push(byte),
            None => {
                return Err(LoadError::Malformed {
                    line: i + 1,
                    text: text.to_string(),
                    src: NamedSource::new(name, src.to_string()),
                    span: (start, text.len()).into(),
                })
            }
        }
    }

    if program.len() > MEMORY_SIZE {
        return Err(LoadError::ProgramTooLarge { len: program.len() });
    }
    Ok(program)
}

fn parse_byte(text: &str) -> Option<u8> {
    if !text.bytes().all(|ch| ch == b'0' || ch == b'1') {
        return None;
    }
    // Leading zeros are fine, anything wider than a byte is not
    u8::from_str_radix(text, 2).ok()
}
