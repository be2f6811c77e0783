//! Property-list utilities — tab-delimited property files in, one JSON
//! array out.
//!
//! A property file (`.pra .prb .prd .pre .prt`) looks like:
//!
//! ```text
//! YPRT                      ← magic tag, skipped
//! 1934285221                ← CRC line, stored under the "crc" key
//! propName		"Oak tree"
//! propFile		"tree/oak.mse"
//! ```
//!
//! Key and value are separated by a double tab; quotes are stripped from
//! values.  Each file contributes one JSON object (plus a `filename` key);
//! the generator writes the collection as a pretty-printed array.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Extensions recognised as property files.
pub const PROPERTY_EXTENSIONS: [&str; 5] = ["pra", "prb", "prd", "pre", "prt"];

/// Default output name for the generator.
pub const PROPERTY_LIST_FILE: &str = "PropertyList.json";

#[derive(Error, Debug)]
pub enum PropertyError {
    #[error("property directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("bad property format in {0}")]
    BadFormat(PathBuf),
    #[error("no property files found")]
    Empty,
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One parsed property file: string keys to string values.
pub type PropertyObject = BTreeMap<String, String>;

fn parse_property_file(path: &Path) -> Result<PropertyObject, PropertyError> {
    let content = fs::read_to_string(path)?;
    if content.is_empty() {
        return Err(PropertyError::BadFormat(path.to_path_buf()));
    }

    let mut parsed = PropertyObject::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match i {
            // Line 0 is the magic tag, line 1 the CRC.
            0 => {}
            1 => {
                parsed.insert("crc".to_owned(), line.to_owned());
            }
            _ => {
                let fields: Vec<&str> = line.split("\t\t").collect();
                if fields.len() != 2 {
                    return Err(PropertyError::BadFormat(path.to_path_buf()));
                }
                parsed.insert(fields[0].to_owned(), fields[1].replace('"', ""));
            }
        }
    }

    if parsed.is_empty() {
        return Err(PropertyError::BadFormat(path.to_path_buf()));
    }
    parsed.insert("filename".to_owned(), path.to_string_lossy().into_owned());
    Ok(parsed)
}

/// Walk `dir` for property files and write them as one JSON array to
/// `output`.  Returns the number of objects written.
pub fn generate_property_list(dir: &Path, output: &Path) -> Result<usize, PropertyError> {
    if !dir.is_dir() {
        return Err(PropertyError::MissingDirectory(dir.to_path_buf()));
    }

    let mut items: BTreeMap<PathBuf, PropertyObject> = BTreeMap::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        let ext = entry.path().extension().and_then(OsStr::to_str).unwrap_or("");
        if !PROPERTY_EXTENSIONS.contains(&ext) {
            continue;
        }
        debug!(file = %entry.path().display(), "property file");
        let parsed = parse_property_file(entry.path())?;
        items.insert(entry.path().to_path_buf(), parsed);
    }

    if items.is_empty() {
        return Err(PropertyError::Empty);
    }

    let array: Vec<&PropertyObject> = items.values().collect();
    serde_json::to_writer_pretty(fs::File::create(output)?, &array)?;

    info!(output = %output.display(), entries = items.len(), "property list generated");
    Ok(items.len())
}

/// Parse a generated property list back into its objects.
pub fn load_property_list(content: &str) -> Result<Vec<PropertyObject>, PropertyError> {
    if content.is_empty() {
        return Err(PropertyError::Empty);
    }
    Ok(serde_json::from_str(content)?)
}

/// Find the property object whose `"crc"` matches.
pub fn property_object(content: &str, crc: u32) -> Result<Option<PropertyObject>, PropertyError> {
    let wanted = crc.to_string();
    Ok(load_property_list(content)?
        .into_iter()
        .find(|item| item.get("crc") == Some(&wanted)))
}
