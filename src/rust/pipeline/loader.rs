use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::error::{PipelineError, Result};
use super::record::{LanguageLabel, RawRecord};
use crate::config::SourceFormat;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads raw sentences from the declared per-language source files.
///
/// Every source is checked when the loader is opened, so a missing file fails
/// the run before any work is done. [`Loader::records`] can be called any
/// number of times; each call re-reads the files from the start and yields the
/// same sequence.
#[derive(Debug, Clone)]
pub struct Loader {
    sources: BTreeMap<LanguageLabel, Vec<PathBuf>>,
    format: SourceFormat,
}

impl Loader {
    /// Validates that every declared source can be opened.
    ///
    /// # Errors
    /// `SourceUnreadable` if a file is missing, unreadable or a directory, or
    /// if a language has no files declared at all.
    pub fn open(sources: BTreeMap<LanguageLabel, Vec<PathBuf>>, format: SourceFormat) -> Result<Self> {
        for (language, paths) in &sources {
            if paths.is_empty() {
                return Err(PipelineError::unreadable(
                    language.as_str(),
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no source files declared for language '{}'", language),
                    ),
                ));
            }
            for path in paths {
                check_readable(path)?;
                log::debug!("Source for '{}' is readable: {:?}", language, path);
            }
        }
        log::info!(
            "Opened {} source file(s) across {} language(s)",
            sources.values().map(Vec::len).sum::<usize>(),
            sources.len()
        );
        Ok(Self { sources, format })
    }

    pub fn languages(&self) -> impl Iterator<Item = &LanguageLabel> {
        self.sources.keys()
    }

    /// Lazily yields every line of every source, languages in label order and
    /// files in declared order. Line content is kept verbatim apart from the
    /// line terminator and a leading byte order mark.
    pub fn records(&self) -> RawRecords<'_> {
        let pending: Vec<(&LanguageLabel, &Path)> = self
            .sources
            .iter()
            .flat_map(|(language, paths)| paths.iter().map(move |p| (language, p.as_path())))
            .collect();
        RawRecords {
            pending: pending.into_iter(),
            current: None,
            labelled: self.format == SourceFormat::Labelled,
            failed: false,
        }
    }
}

fn check_readable(path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| PipelineError::unreadable(path, e))?;
    let metadata = file.metadata().map_err(|e| PipelineError::unreadable(path, e))?;
    if !metadata.is_file() {
        return Err(PipelineError::unreadable(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok(())
}

struct OpenSource<'a> {
    language: &'a LanguageLabel,
    path: &'a Path,
    reader: BufReader<File>,
    line_no: usize,
}

/// Iterator returned by [`Loader::records`].
pub struct RawRecords<'a> {
    pending: std::vec::IntoIter<(&'a LanguageLabel, &'a Path)>,
    current: Option<OpenSource<'a>>,
    labelled: bool,
    failed: bool,
}

impl<'a> Iterator for RawRecords<'a> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.current.is_none() {
                let (language, path) = self.pending.next()?;
                match File::open(path) {
                    Ok(file) => {
                        self.current = Some(OpenSource {
                            language,
                            path,
                            reader: BufReader::new(file),
                            line_no: 0,
                        });
                    }
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(PipelineError::unreadable(path, e)));
                    }
                }
            }

            let source = self.current.as_mut()?;
            let mut buf = Vec::new();
            match source.reader.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    log::debug!("Finished {:?} after {} lines", source.path, source.line_no);
                    self.current = None;
                }
                Ok(_) => {
                    source.line_no += 1;
                    let text = decode_line(&buf, source.line_no == 1);
                    return Some(Ok(RawRecord {
                        text,
                        language: source.language.clone(),
                        source: source.path.to_path_buf(),
                        line_no: source.line_no,
                        labelled: self.labelled,
                    }));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(PipelineError::unreadable(source.path, e)));
                }
            }
        }
    }
}

fn decode_line(mut bytes: &[u8], first_line: bool) -> String {
    if let Some(rest) = bytes.strip_suffix(b"\n") {
        bytes = rest.strip_suffix(b"\r").unwrap_or(rest);
    }
    if first_line {
        bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn label(s: &str) -> LanguageLabel {
        LanguageLabel::new(s).unwrap()
    }

    #[test]
    fn test_reads_lines_verbatim() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let en = dir.path().join("en.txt");
        fs::write(&en, b"\xEF\xBB\xBF  Hello,  world \r\n\nlast line").unwrap();

        let mut sources = BTreeMap::new();
        sources.insert(label("en"), vec![en.clone()]);
        let loader = Loader::open(sources, SourceFormat::Plain)?;

        let records: Vec<RawRecord> = loader.records().collect::<Result<_>>()?;
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["  Hello,  world ", "", "last line"]);
        assert_eq!(records[2].line_no, 3);
        assert_eq!(records[0].source, en);
        assert!(!records[0].labelled);
        Ok(())
    }

    #[test]
    fn test_is_restartable() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let en = dir.path().join("en.txt");
        let sn = dir.path().join("sn.txt");
        fs::write(&en, "Good morning\nThank you\n").unwrap();
        fs::write(&sn, "Mangwanani\nNdatenda\n").unwrap();

        let mut sources = BTreeMap::new();
        sources.insert(label("shona"), vec![sn]);
        sources.insert(label("en"), vec![en]);
        let loader = Loader::open(sources, SourceFormat::Plain)?;

        let first: Vec<RawRecord> = loader.records().collect::<Result<_>>()?;
        let second: Vec<RawRecord> = loader.records().collect::<Result<_>>()?;
        assert_eq!(first, second);
        // languages come out in label order
        assert_eq!(first[0].language.as_str(), "en");
        assert_eq!(first[3].text, "Ndatenda");
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_is_replaced() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let sn = dir.path().join("sn.txt");
        fs::write(&sn, b"Mhoro \xFF shamwari\n").unwrap();

        let mut sources = BTreeMap::new();
        sources.insert(label("shona"), vec![sn]);
        let loader = Loader::open(sources, SourceFormat::Plain)?;
        let records: Vec<RawRecord> = loader.records().collect::<Result<_>>()?;
        assert_eq!(records[0].text, "Mhoro \u{FFFD} shamwari");
        Ok(())
    }

    #[test]
    fn test_missing_source_fails_on_open() {
        let dir = TempDir::new().unwrap();
        let mut sources = BTreeMap::new();
        sources.insert(label("en"), vec![dir.path().join("nope.txt")]);
        let err = Loader::open(sources, SourceFormat::Plain).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_language_without_files_is_unreadable() {
        let mut sources = BTreeMap::new();
        sources.insert(label("en"), Vec::new());
        let err = Loader::open(sources, SourceFormat::Plain).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_directory_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let mut sources = BTreeMap::new();
        sources.insert(label("en"), vec![dir.path().to_path_buf()]);
        assert!(Loader::open(sources, SourceFormat::Plain).is_err());
    }
}
