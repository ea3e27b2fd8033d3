use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use util::archive_guard::{self, ArchiveFormat};

/// What a submitted byte buffer is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    WordProcessor,
    Presentation,
    ArchiveContainer,
}

impl FileKind {
    /// Maps a file extension (with or without the leading dot) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "docx" | "docm" | "dotx" | "dotm" => Some(FileKind::WordProcessor),
            "pptx" | "pptm" | "potx" | "potm" | "ppsx" => Some(FileKind::Presentation),
            "zip" | "rar" => Some(FileKind::ArchiveContainer),
            _ => None,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Guesses the kind from content alone.
    ///
    /// OOXML packages are told apart by their main part; any other ZIP or a RAR
    /// is treated as a generic container. Returns `None` for non-archives.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match archive_guard::detect_format(bytes)? {
            ArchiveFormat::Rar => Some(FileKind::ArchiveContainer),
            ArchiveFormat::Zip => {
                let Ok(entries) = archive_guard::list_entries(bytes) else {
                    return Some(FileKind::ArchiveContainer);
                };
                let has = |wanted: &str| {
                    entries
                        .iter()
                        .any(|e| e.name.trim_start_matches('/').eq_ignore_ascii_case(wanted))
                };
                if !has("[Content_Types].xml") {
                    Some(FileKind::ArchiveContainer)
                } else if has("word/document.xml") {
                    Some(FileKind::WordProcessor)
                } else if has("ppt/presentation.xml") {
                    Some(FileKind::Presentation)
                } else {
                    Some(FileKind::ArchiveContainer)
                }
            }
        }
    }

    pub fn is_office(&self) -> bool {
        !matches!(self, FileKind::ArchiveContainer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::WordProcessor => "word-processor",
            FileKind::Presentation => "presentation",
            FileKind::ArchiveContainer => "archive-container",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "word-processor" | "word" | "docx" => Ok(FileKind::WordProcessor),
            "presentation" | "pptx" => Ok(FileKind::Presentation),
            "archive-container" | "archive" | "zip" | "rar" => Ok(FileKind::ArchiveContainer),
            other => Err(format!("unknown file kind '{other}'")),
        }
    }
}
