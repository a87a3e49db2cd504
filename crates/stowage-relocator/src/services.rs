//! Service registration merging.
//!
//! Files under `META-INF/services/` are named after an interface and list
//! one implementation per line. Relocation can map two distinct files onto
//! the same name, so files are collected here and written once at the end,
//! with every provider from every source kept.

use std::collections::{HashMap, HashSet};

use stowage_core::RelocationRules;

/// Directory holding service registration files.
pub(crate) const SERVICES_DIR: &str = "META-INF/services/";

/// Interface name of a service registration entry, if `name` is one.
pub(crate) fn service_interface(name: &str) -> Option<&str> {
    let interface = name.strip_prefix(SERVICES_DIR)?;
    (!interface.is_empty() && !interface.contains('/')).then_some(interface)
}

#[derive(Debug, Default)]
struct ServiceFile {
    providers: Vec<String>,
    seen: HashSet<String>,
}

/// Accumulates relocated service files keyed by output name.
#[derive(Debug, Default)]
pub(crate) struct ServiceMerger {
    files: Vec<(String, ServiceFile)>,
    index: HashMap<String, usize>,
    merged: usize,
}

impl ServiceMerger {
    /// Add the file `interface` with `content`, relocating both the name and
    /// every provider line. Comments and blank lines are dropped.
    pub(crate) fn add(&mut self, interface: &str, content: &str, rules: &RelocationRules) {
        let target = rules
            .map_class(interface)
            .unwrap_or_else(|| interface.to_string());
        let name = format!("{SERVICES_DIR}{target}");

        let position = match self.index.get(&name) {
            Some(&position) => {
                self.merged = self.merged.saturating_add(1);
                position
            },
            None => {
                let position = self.files.len();
                self.files.push((name.clone(), ServiceFile::default()));
                self.index.insert(name, position);
                position
            },
        };
        let Some((_, file)) = self.files.get_mut(position) else {
            return;
        };

        for line in content.lines() {
            let provider = line.split('#').next().unwrap_or_default().trim();
            if provider.is_empty() {
                continue;
            }
            let provider = rules
                .map_class(provider)
                .unwrap_or_else(|| provider.to_string());
            if file.seen.insert(provider.clone()) {
                file.providers.push(provider);
            }
        }
    }

    /// How many source files were folded into an already present output.
    pub(crate) fn merged(&self) -> usize {
        self.merged
    }

    /// Output entries as `(name, contents)` in first-seen order.
    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, Vec<u8>)> {
        self.files.into_iter().map(|(name, file)| {
            let mut body = String::new();
            for provider in file.providers {
                body.push_str(&provider);
                body.push('\n');
            }
            (name, body.into_bytes())
        })
    }
}
