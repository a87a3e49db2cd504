//! Whole-archive relocation.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use stowage_core::RelocationRules;
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::classfile::relocate_class;
use crate::error::{RelocationError, RelocationResult};
use crate::names::map_entry_name;
use crate::services::{ServiceMerger, service_interface};

/// Upper bound on buffer space reserved from an entry's declared size.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Deflate level for entries whose contents are rewritten.
const COMPRESSION_LEVEL: i64 = 9;

/// Counters describing one relocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationStats {
    /// The archive was copied byte for byte (empty rule set).
    pub copied_verbatim: bool,
    /// Class entries whose constant pool changed.
    pub classes_rewritten: usize,
    /// Entries moved to a new name with their bytes untouched.
    pub entries_renamed: usize,
    /// Entries copied unchanged.
    pub entries_copied: usize,
    /// Service files folded into another with the same relocated name.
    pub services_merged: usize,
    /// Later entries dropped because their output name was already taken.
    pub duplicates_dropped: usize,
    /// Signature files dropped.
    pub signatures_dropped: usize,
}

/// Rewrites one archive into another under a set of relocation rules.
///
/// A relocator runs exactly once; running it again fails with
/// [`RelocationError::AlreadyRun`].
///
/// # Entry handling
///
/// - Empty rule set: the file is copied byte for byte.
/// - `*.class`: the constant pool is rewritten and the entry renamed after
///   its relocated type.
/// - `META-INF/services/*`: names and providers are relocated, and files
///   that collide after relocation are merged.
/// - Jar signature files and `META-INF/INDEX.LIST` are dropped, since the
///   rewrite invalidates them.
/// - Everything else is renamed if it sits under a relocated package and is
///   otherwise copied with its original bytes and compression.
///
/// Output names are claimed first-come: a later entry whose output name is
/// already written is dropped. Directory names always end in `/`, so a
/// directory never shadows a file. Parent directories are synthesised for
/// every written entry and share the same name set, so an input directory
/// entry that arrives after a synthesised one is dropped as a duplicate.
#[derive(Debug)]
pub struct JarRelocator {
    input: PathBuf,
    output: PathBuf,
    rules: RelocationRules,
    used: AtomicBool,
}

impl JarRelocator {
    /// Create a relocator from `input` to `output`.
    #[must_use]
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        rules: RelocationRules,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            rules,
            used: AtomicBool::new(false),
        }
    }

    /// Run the relocation.
    ///
    /// # Errors
    ///
    /// Returns [`RelocationError::AlreadyRun`] on a second call, and I/O,
    /// archive or class format errors otherwise.
    pub fn run(&self) -> RelocationResult<RelocationStats> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(RelocationError::AlreadyRun);
        }

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        if self.rules.is_empty() {
            std::fs::copy(&self.input, &self.output).map_err(|e| io_error(&self.input, e))?;
            debug!(input = %self.input.display(), "No relocation rules, copied archive");
            return Ok(RelocationStats {
                copied_verbatim: true,
                ..RelocationStats::default()
            });
        }

        let stats = self.rewrite()?;
        debug!(
            input = %self.input.display(),
            output = %self.output.display(),
            classes = stats.classes_rewritten,
            renamed = stats.entries_renamed,
            merged_services = stats.services_merged,
            dropped = stats.duplicates_dropped,
            "Relocated archive"
        );
        Ok(stats)
    }

    fn rewrite(&self) -> RelocationResult<RelocationStats> {
        let input = File::open(&self.input).map_err(|e| io_error(&self.input, e))?;
        let mut archive =
            ZipArchive::new(BufReader::new(input)).map_err(|e| archive_error(&self.input, e))?;
        let output = File::create(&self.output).map_err(|e| io_error(&self.output, e))?;

        let mut pass = Pass {
            writer: ZipWriter::new(BufWriter::new(output)),
            output: &self.output,
            written: HashSet::new(),
            stats: RelocationStats::default(),
        };
        let mut services = ServiceMerger::default();

        for index in 0..archive.len() {
            let (name, is_dir) = {
                let entry = archive
                    .by_index_raw(index)
                    .map_err(|e| archive_error(&self.input, e))?;
                (entry.name().to_string(), entry.is_dir())
            };

            if is_dir {
                let target = map_entry_name(&name, &self.rules).unwrap_or(name);
                pass.directory(&target)?;
                continue;
            }

            if is_signature_file(&name) {
                trace!(entry = %name, "Dropping signature file");
                pass.stats.signatures_dropped = pass.stats.signatures_dropped.saturating_add(1);
                continue;
            }

            if let Some(interface) = service_interface(&name) {
                let content = read_entry(&mut archive, index, &self.input)?;
                services.add(interface, &String::from_utf8_lossy(&content), &self.rules);
                continue;
            }

            let target = map_entry_name(&name, &self.rules);
            let renamed = target.is_some();
            let target = target.unwrap_or_else(|| name.clone());

            if name.ends_with(".class") {
                let content = read_entry(&mut archive, index, &self.input)?;
                let rewritten = relocate_class(&content, &self.rules).map_err(|source| {
                    RelocationError::MalformedClass {
                        entry: name.clone(),
                        source,
                    }
                })?;
                if let Some(bytes) = rewritten {
                    if pass.write(&target, &bytes)? {
                        pass.stats.classes_rewritten =
                            pass.stats.classes_rewritten.saturating_add(1);
                    }
                    continue;
                }
            }

            if !pass.claim_with_parents(&target)? {
                continue;
            }
            let raw = archive
                .by_index_raw(index)
                .map_err(|e| archive_error(&self.input, e))?;
            pass.writer
                .raw_copy_file_rename(raw, target.as_str())
                .map_err(|e| archive_error(&self.output, e))?;
            if renamed {
                pass.stats.entries_renamed = pass.stats.entries_renamed.saturating_add(1);
            } else {
                pass.stats.entries_copied = pass.stats.entries_copied.saturating_add(1);
            }
        }

        pass.stats.services_merged = services.merged();
        for (name, content) in services.into_entries() {
            pass.write(&name, &content)?;
        }

        pass.finish()
    }
}

/// Relocate `input` into `output` in one call.
///
/// # Errors
///
/// See [`JarRelocator::run`].
pub fn relocate(
    input: &Path,
    output: &Path,
    rules: &RelocationRules,
) -> RelocationResult<RelocationStats> {
    JarRelocator::new(input, output, rules.clone()).run()
}

/// Output side of one relocation.
struct Pass<'a> {
    writer: ZipWriter<BufWriter<File>>,
    output: &'a Path,
    written: HashSet<String>,
    stats: RelocationStats,
}

impl Pass<'_> {
    fn deflated() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(COMPRESSION_LEVEL))
    }

    /// Claim `name` for writing. Returns `false` if it was already written.
    fn claim(&mut self, name: &str) -> bool {
        if self.written.insert(name.to_string()) {
            true
        } else {
            trace!(entry = %name, "Dropping duplicate entry");
            self.stats.duplicates_dropped = self.stats.duplicates_dropped.saturating_add(1);
            false
        }
    }

    /// Write directory entries for every parent of `name` not yet present.
    fn parents(&mut self, name: &str) -> RelocationResult<()> {
        let trimmed = name.strip_suffix('/').unwrap_or(name);
        for (position, _) in trimmed.match_indices('/') {
            let Some(parent) = name.get(..=position) else {
                continue;
            };
            if self.written.insert(parent.to_string()) {
                self.writer
                    .add_directory(parent, SimpleFileOptions::default())
                    .map_err(|e| archive_error(self.output, e))?;
            }
        }
        Ok(())
    }

    fn claim_with_parents(&mut self, name: &str) -> RelocationResult<bool> {
        if !self.claim(name) {
            return Ok(false);
        }
        self.parents(name)?;
        Ok(true)
    }

    fn directory(&mut self, name: &str) -> RelocationResult<()> {
        if !self.claim_with_parents(name)? {
            return Ok(());
        }
        self.writer
            .add_directory(name, SimpleFileOptions::default())
            .map_err(|e| archive_error(self.output, e))
    }

    /// Write a deflated file entry. Returns `false` if the name was taken.
    fn write(&mut self, name: &str, content: &[u8]) -> RelocationResult<bool> {
        if !self.claim_with_parents(name)? {
            return Ok(false);
        }
        self.writer
            .start_file(name, Self::deflated())
            .map_err(|e| archive_error(self.output, e))?;
        self.writer
            .write_all(content)
            .map_err(|e| io_error(self.output, e))?;
        Ok(true)
    }

    fn finish(self) -> RelocationResult<RelocationStats> {
        let mut inner = self
            .writer
            .finish()
            .map_err(|e| archive_error(self.output, e))?;
        inner.flush().map_err(|e| io_error(self.output, e))?;
        Ok(self.stats)
    }
}

fn read_entry(
    archive: &mut ZipArchive<BufReader<File>>,
    index: usize,
    path: &Path,
) -> RelocationResult<Vec<u8>> {
    let mut entry = archive
        .by_index(index)
        .map_err(|e| archive_error(path, e))?;
    let mut content = Vec::with_capacity(capacity_hint(entry.size()));
    entry
        .read_to_end(&mut content)
        .map_err(|e| io_error(path, e))?;
    Ok(content)
}

/// Buffer space to reserve for an entry declaring `size` uncompressed
/// bytes. Headers are untrusted, so the reservation is capped.
fn capacity_hint(size: u64) -> usize {
    usize::try_from(size.min(MAX_PREALLOCATION)).unwrap_or_default()
}

/// Jar signature material under `META-INF/`, plus the jar index.
fn is_signature_file(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    if file == "INDEX.LIST" {
        return true;
    }
    let upper = file.to_ascii_uppercase();
    [".SF", ".DSA", ".RSA", ".EC"]
        .iter()
        .any(|suffix| upper.ends_with(suffix))
}

fn io_error(path: &Path, source: std::io::Error) -> RelocationError {
    RelocationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn archive_error(path: &Path, source: zip::result::ZipError) -> RelocationError {
    RelocationError::Archive {
        path: path.to_path_buf(),
        source,
    }
}
