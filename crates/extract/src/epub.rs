//! EPUB extraction from the OPF package document's Dublin Core metadata.

use crate::consts::{
    CONTAINER_PATH, CREATOR_REGEX, ENTITY_REGEX, METADATA_REGEX, PUBLISHER_REGEX, ROOTFILE_REGEX, TAG_REGEX,
    TITLE_REGEX, WHITESPACE_REGEX,
};
use crate::error::{ErrorKind, Result};
use crate::{FormatExtractor, Record};
use exn::{OptionExt, ResultExt};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::instrument;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, Default)]
pub struct Epub;

impl FormatExtractor for Epub {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn extensions(&self) -> &[&'static str] {
        &["epub"]
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn extract(&self, path: &Path) -> Result<Record> {
        let file = File::open(path).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let mut archive = ZipArchive::new(BufReader::new(file)).or_raise(|| ErrorKind::Archive)?;
        // Broken containers are common enough in the wild that we fall back to
        // the first package document in the archive.
        let package_path = read_entry(&mut archive, CONTAINER_PATH)
            .ok()
            .and_then(|container| package_path(&container))
            .or_else(|| {
                archive.file_names().find(|name| name.to_ascii_lowercase().ends_with(".opf")).map(ToOwned::to_owned)
            })
            .ok_or_raise(|| ErrorKind::MissingEntry("package document".to_string()))?;
        let package = read_entry(&mut archive, &package_path)?;
        Ok(parse_package(&package))
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut entry = archive.by_name(name).or_raise(|| ErrorKind::MissingEntry(name.to_string()))?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).or_raise(|| ErrorKind::Archive)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn package_path(container: &str) -> Option<String> {
    ROOTFILE_REGEX.captures(container).and_then(|c| c.get(1)).map(|m| unescape(m.as_str()).into_owned())
}

/// Reads title, creators and publisher out of an OPF package document.
pub(crate) fn parse_package(package: &str) -> Record {
    // Only look inside <metadata> when there is one; the manifest and guide
    // sections can carry their own `title` attributes and elements.
    let metadata = METADATA_REGEX.captures(package).and_then(|c| c.get(1)).map_or(package, |m| m.as_str());
    Record::new(
        elements(&TITLE_REGEX, metadata).next(),
        elements(&CREATOR_REGEX, metadata),
        elements(&PUBLISHER_REGEX, metadata).next(),
    )
}

fn elements<'a>(regex: &'a Regex, xml: &'a str) -> impl Iterator<Item = String> + 'a {
    regex.captures_iter(xml).filter_map(|c| c.get(1)).map(|m| text(m.as_str()))
}

/// Flattens element content to plain text: strips nested markup, resolves
/// entities and collapses whitespace.
fn text(content: &str) -> String {
    let content = content.trim();
    let content = content
        .strip_prefix("<![CDATA[")
        .and_then(|c| c.strip_suffix("]]>"))
        .map(Cow::Borrowed)
        .unwrap_or_else(|| unescape(&TAG_REGEX.replace_all(content, "")).into_owned().into());
    WHITESPACE_REGEX.replace_all(content.trim(), " ").into_owned()
}

fn unescape(value: &str) -> Cow<'_, str> {
    ENTITY_REGEX.replace_all(value, |captures: &Captures<'_>| {
        let entity = &captures[1];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            hex if hex.starts_with("#x") || hex.starts_with("#X") => {
                u32::from_str_radix(&hex[2..], 16).ok().and_then(char::from_u32)
            },
            dec => dec[1..].parse::<u32>().ok().and_then(char::from_u32),
        };
        decoded.map_or_else(|| captures[0].to_string(), String::from)
    })
}
