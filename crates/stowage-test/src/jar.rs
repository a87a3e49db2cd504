//! In-memory archive assembly.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone)]
enum Item {
    File {
        name: String,
        data: Vec<u8>,
        method: CompressionMethod,
    },
    Directory(String),
}

/// Builder for a jar archive held in memory.
///
/// Entries are written in the order they were added. Names must be unique.
#[derive(Debug, Clone, Default)]
pub struct JarBuilder {
    items: Vec<Item>,
}

impl JarBuilder {
    /// Start an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a deflated file entry.
    #[must_use]
    pub fn entry(self, name: impl Into<String>, data: impl AsRef<[u8]>) -> Self {
        self.entry_with(name, data, CompressionMethod::Deflated)
    }

    /// Add a stored (uncompressed) file entry.
    #[must_use]
    pub fn stored(self, name: impl Into<String>, data: impl AsRef<[u8]>) -> Self {
        self.entry_with(name, data, CompressionMethod::Stored)
    }

    fn entry_with(
        mut self,
        name: impl Into<String>,
        data: impl AsRef<[u8]>,
        method: CompressionMethod,
    ) -> Self {
        self.items.push(Item::File {
            name: name.into(),
            data: data.as_ref().to_vec(),
            method,
        });
        self
    }

    /// Add a class file entry under its internal name (`a/b/C` becomes
    /// `a/b/C.class`).
    #[must_use]
    pub fn class(self, internal_name: &str, bytes: impl AsRef<[u8]>) -> Self {
        self.entry(format!("{internal_name}.class"), bytes)
    }

    /// Add a service registration file.
    #[must_use]
    pub fn service(self, interface: &str, providers: &[&str]) -> Self {
        let mut body = providers.join("\n");
        body.push('\n');
        self.entry(format!("META-INF/services/{interface}"), body)
    }

    /// Add a directory entry. A trailing `/` is appended if missing.
    #[must_use]
    pub fn directory(mut self, name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        self.items.push(Item::Directory(name));
        self
    }

    /// Encode the archive.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate entry name.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for item in &self.items {
            match item {
                Item::File { name, data, method } => {
                    let options = SimpleFileOptions::default().compression_method(*method);
                    writer.start_file(name.as_str(), options).expect("start entry");
                    writer.write_all(data).expect("write entry");
                },
                Item::Directory(name) => {
                    writer
                        .add_directory(name.as_str(), SimpleFileOptions::default())
                        .expect("add directory");
                },
            }
        }
        writer.finish().expect("finish archive").into_inner()
    }

    /// Encode the archive and write it to `path`.
    ///
    /// # Panics
    ///
    /// Panics on I/O failure.
    pub fn write_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create archive directory");
        }
        std::fs::write(path, self.build()).expect("write archive");
    }
}

/// Read every entry of an archive as `(name, contents)`, in archive order.
/// Directory entries have empty contents.
///
/// # Panics
///
/// Panics if the archive cannot be read.
#[must_use]
pub fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).expect("read archive");
    read_jar_bytes(&bytes)
}

/// Like [`read_jar`], for an archive already in memory.
///
/// # Panics
///
/// Panics if the archive cannot be decoded.
#[must_use]
pub fn read_jar_bytes(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("open archive");
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).expect("archive entry");
        let mut data = Vec::new();
        file.read_to_end(&mut data).expect("entry contents");
        entries.push((file.name().to_string(), data));
    }
    entries
}

/// Contents of the entry named `name`, if present.
#[must_use]
pub fn jar_entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    entries
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, data)| data.as_slice())
}

/// Names of all entries, in archive order.
#[must_use]
pub fn jar_entry_names(entries: &[(String, Vec<u8>)]) -> Vec<&str> {
    entries.iter().map(|(n, _)| n.as_str()).collect()
}
