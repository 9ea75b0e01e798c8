//! Compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - META-INF/container.xml  — declares the root MusicXML file path
//!   - <rootfile>.xml          — the actual MusicXML content
//!   - (optional) other files  — images, sounds, etc.

use std::io::{Cursor, Read, Write};

use log::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ReadError;
use crate::score::Score;
use crate::{reader, writer};

/// Read and parse a .mxl archive from raw bytes.
pub fn read_mxl(data: &[u8]) -> Result<Score, ReadError> {
    let xml = extract_musicxml(data)?;
    reader::read_musicxml(&xml)
}

/// Extract the MusicXML content string from .mxl bytes.
pub fn extract_musicxml(data: &[u8]) -> Result<String, ReadError> {
    let cursor = Cursor::new(data);
    let mut archive = ZipArchive::new(cursor)?;

    let root_file_path = read_container_xml(&mut archive)?;
    debug!("mxl root file: {root_file_path}");

    let mut root_file = archive
        .by_name(&root_file_path)
        .map_err(|_| ReadError::Format(format!("root file '{root_file_path}' not in archive")))?;

    let mut xml = String::new();
    root_file.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Parse META-INF/container.xml to find the root MusicXML file path.
fn read_container_xml(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, ReadError> {
    let container_xml = {
        match archive.by_name("META-INF/container.xml") {
            Ok(mut container_file) => {
                let mut xml = String::new();
                container_file.read_to_string(&mut xml)?;
                Some(xml)
            }
            Err(_) => None,
        }
    }; // mutable borrow of archive is released here

    if let Some(xml) = container_xml {
        let doc = roxmltree::Document::parse(&xml)?;
        for node in doc.descendants() {
            if node.tag_name().name() == "rootfile" {
                if let Some(path) = node.attribute("full-path") {
                    return Ok(path.to_string());
                }
            }
        }
        return Err(ReadError::Format(
            "no rootfile found in container.xml".into(),
        ));
    }

    // Fallback: look for a MusicXML file anywhere outside META-INF.
    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .collect();
    for name in &names {
        if !name.starts_with("META-INF/")
            && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        {
            return Ok(name.clone());
        }
    }

    Err(ReadError::Format(format!(
        "no MusicXML file found in archive, files: {names:?}"
    )))
}

/// Render a score as a .mxl archive: stored `mimetype` entry first, then
/// the container manifest and the score itself.
pub fn write_mxl(score: &Score) -> Result<Vec<u8>, ReadError> {
    let xml = writer::write_musicxml(score);
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    archive.start_file("mimetype", stored)?;
    archive.write_all(b"application/vnd.recordare.musicxml")?;

    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    archive.start_file("META-INF/container.xml", deflated)?;
    archive.write_all(container_manifest().as_bytes())?;

    archive.start_file("score.xml", deflated)?;
    archive.write_all(xml.as_bytes())?;

    let cursor = archive.finish()?;
    Ok(cursor.into_inner())
}

fn container_manifest() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<container>\n",
        "  <rootfiles>\n",
        "    <rootfile full-path=\"score.xml\" ",
        "media-type=\"application/vnd.recordare.musicxml+xml\"/>\n",
        "  </rootfiles>\n",
        "</container>\n"
    )
    .to_string()
}
