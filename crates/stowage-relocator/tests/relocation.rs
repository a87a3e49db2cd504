//! End-to-end archive relocation tests.

use std::fs::File;
use std::path::{Path, PathBuf};

use stowage_core::RelocationRules;
use stowage_relocator::{JarRelocator, RelocationError, relocate};
use stowage_test::{ClassFileBuilder, ClassFileView, JarBuilder, jar_entry, jar_entry_names, read_jar};
use tempfile::TempDir;
use zip::{CompressionMethod, ZipArchive};

fn rules() -> RelocationRules {
    RelocationRules::from_pairs([("a.b", "x.y")]).unwrap()
}

fn input(tmp: &TempDir, jar: &JarBuilder) -> (PathBuf, PathBuf) {
    let input = tmp.path().join("input.jar");
    jar.write_to(&input);
    (input, tmp.path().join("output.jar"))
}

fn compression_of(path: &Path, name: &str) -> CompressionMethod {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.by_name(name).unwrap().compression()
}

#[test]
fn empty_rules_copy_byte_for_byte() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new()
        .class("a/b/Main", ClassFileBuilder::new("a/b/Main").build())
        .service("a.b.Api", &["a.b.Impl"])
        .stored("a/b/data.bin", [1u8, 2, 3]);
    let (input, output) = input(&tmp, &jar);

    let stats = relocate(&input, &output, &RelocationRules::new()).unwrap();

    assert!(stats.copied_verbatim);
    assert_eq!(std::fs::read(&input).unwrap(), std::fs::read(&output).unwrap());
}

#[test]
fn output_parent_directories_are_created() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new().entry("a/b/notes.txt", b"n");
    let (input, _) = input(&tmp, &jar);

    let copied = tmp.path().join("copy/nested/out.jar");
    assert!(relocate(&input, &copied, &RelocationRules::new()).unwrap().copied_verbatim);
    assert_eq!(std::fs::read(&copied).unwrap(), std::fs::read(&input).unwrap());

    let relocated = tmp.path().join("rewrite/nested/out.jar");
    relocate(&input, &relocated, &rules()).unwrap();
    assert!(jar_entry(&read_jar(&relocated), "x/y/notes.txt").is_some());
}

#[test]
fn class_references_and_path_are_relocated() {
    let tmp = tempfile::tempdir().unwrap();
    let class = ClassFileBuilder::new("a/b/Main")
        .field("helper", "La/b/C;")
        .string("a.b.C")
        .build();
    let (input, output) = input(&tmp, &JarBuilder::new().class("a/b/Main", class));

    let stats = relocate(&input, &output, &rules()).unwrap();
    assert_eq!(stats.classes_rewritten, 1);

    let entries = read_jar(&output);
    assert!(jar_entry(&entries, "a/b/Main.class").is_none());
    let view = ClassFileView::parse(jar_entry(&entries, "x/y/Main.class").unwrap()).unwrap();
    assert_eq!(view.this_class(), Some("x/y/Main"));
    assert!(view.utf8_constants().contains(&"Lx/y/C;"));
    assert_eq!(view.string_constants(), ["x.y.C"]);
}

#[test]
fn annotation_values_follow_relocated_classes() {
    let tmp = tempfile::tempdir().unwrap();
    let class = ClassFileBuilder::new("a/b/Main")
        .annotation("La/b/Service;", &[("implementation", "a.b.impl.Default")])
        .build();
    let (input, output) = input(&tmp, &JarBuilder::new().class("a/b/Main", class));

    relocate(&input, &output, &rules()).unwrap();

    let entries = read_jar(&output);
    let view = ClassFileView::parse(jar_entry(&entries, "x/y/Main.class").unwrap()).unwrap();
    let utf8 = view.utf8_constants();
    assert!(utf8.contains(&"x.y.impl.Default"));
    assert!(utf8.contains(&"Lx/y/Service;"));
    assert!(!view.mentions("a.b"));
}

#[test]
fn unmatched_classes_are_copied_unchanged() {
    let tmp = tempfile::tempdir().unwrap();
    let class = ClassFileBuilder::new("c/d/Main").build();
    let (input, output) = input(&tmp, &JarBuilder::new().class("c/d/Main", &class));

    relocate(&input, &output, &rules()).unwrap();

    let entries = read_jar(&output);
    assert_eq!(jar_entry(&entries, "c/d/Main.class"), Some(class.as_slice()));
}

#[test]
fn colliding_service_files_are_merged() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new()
        .service("a.b.Api", &["a.b.First", "shared.Impl"])
        .service("c.d.Api", &["c.d.Second", "shared.Impl"]);
    let (input, output) = input(&tmp, &jar);
    let rules = RelocationRules::from_pairs([("a.b", "x.y"), ("c.d", "x.y")]).unwrap();

    let stats = relocate(&input, &output, &rules).unwrap();
    assert_eq!(stats.services_merged, 1);

    let entries = read_jar(&output);
    let services: Vec<_> = jar_entry_names(&entries)
        .into_iter()
        .filter(|n| n.starts_with("META-INF/services/") && !n.ends_with('/'))
        .collect();
    assert_eq!(services, ["META-INF/services/x.y.Api"]);
    let body = String::from_utf8(
        jar_entry(&entries, "META-INF/services/x.y.Api")
            .unwrap()
            .to_vec(),
    )
    .unwrap();
    let lines: Vec<_> = body.lines().collect();
    assert_eq!(lines, ["x.y.First", "shared.Impl", "x.y.Second"]);
}

#[test]
fn resources_keep_bytes_and_compression() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new()
        .stored("a/b/messages.properties", b"greeting=hi\n")
        .entry("README.txt", b"readme");
    let (input, output) = input(&tmp, &jar);

    let stats = relocate(&input, &output, &rules()).unwrap();
    assert_eq!(stats.entries_renamed, 1);
    assert_eq!(stats.entries_copied, 1);

    let entries = read_jar(&output);
    assert_eq!(
        jar_entry(&entries, "x/y/messages.properties"),
        Some(&b"greeting=hi\n"[..])
    );
    assert_eq!(jar_entry(&entries, "README.txt"), Some(&b"readme"[..]));
    assert_eq!(
        compression_of(&output, "x/y/messages.properties"),
        CompressionMethod::Stored
    );
    assert_eq!(compression_of(&output, "README.txt"), CompressionMethod::Deflated);
}

#[test]
fn first_entry_wins_on_collision() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new()
        .entry("a/b/notes.txt", b"relocated")
        .entry("x/y/notes.txt", b"native");
    let (input, output) = input(&tmp, &jar);

    let stats = relocate(&input, &output, &rules()).unwrap();
    assert_eq!(stats.duplicates_dropped, 1);

    let entries = read_jar(&output);
    let notes: Vec<_> = entries.iter().filter(|(n, _)| n == "x/y/notes.txt").collect();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].1, b"relocated");
}

#[test]
fn directories_are_renamed_and_synthesised() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new()
        .directory("a/")
        .directory("a/b/")
        .class("a/b/Main", ClassFileBuilder::new("a/b/Main").build())
        .entry("deep/nested/file.txt", b"x");
    let (input, output) = input(&tmp, &jar);

    relocate(&input, &output, &rules()).unwrap();

    let entries = read_jar(&output);
    let names = jar_entry_names(&entries);
    for dir in ["a/", "x/", "x/y/", "deep/", "deep/nested/"] {
        assert_eq!(
            names.iter().filter(|n| **n == dir).count(),
            1,
            "expected exactly one {dir} in {names:?}"
        );
    }
    assert!(!names.contains(&"a/b/"));
    let main = names.iter().position(|n| *n == "x/y/Main.class").unwrap();
    let parent = names.iter().position(|n| *n == "x/y/").unwrap();
    assert!(parent < main);
}

#[test]
fn file_and_directory_of_the_same_path_coexist() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new()
        .entry("docs", b"plain file")
        .entry("docs/readme.txt", b"nested")
        .directory("docs/");
    let (input, output) = input(&tmp, &jar);

    relocate(&input, &output, &rules()).unwrap();

    let entries = read_jar(&output);
    let names = jar_entry_names(&entries);
    for name in ["docs", "docs/", "docs/readme.txt"] {
        assert_eq!(names.iter().filter(|n| **n == name).count(), 1, "{names:?}");
    }
    assert_eq!(jar_entry(&entries, "docs").unwrap(), b"plain file");
    // The synthesised parent claimed the name before the input directory.
    let dir = names.iter().position(|n| *n == "docs/").unwrap();
    let file = names.iter().position(|n| *n == "docs/readme.txt").unwrap();
    assert!(dir < file);
}

#[test]
fn signature_files_are_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new()
        .entry("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n")
        .entry("META-INF/SIGNER.SF", b"sig")
        .entry("META-INF/SIGNER.RSA", b"sig")
        .entry("META-INF/INDEX.LIST", b"index");
    let (input, output) = input(&tmp, &jar);

    let stats = relocate(&input, &output, &rules()).unwrap();
    assert_eq!(stats.signatures_dropped, 3);

    let entries = read_jar(&output);
    let names = jar_entry_names(&entries);
    assert!(names.contains(&"META-INF/MANIFEST.MF"));
    assert!(!names.iter().any(|n| n.ends_with(".SF") || n.ends_with(".RSA")));
    assert!(!names.contains(&"META-INF/INDEX.LIST"));
}

#[test]
fn multi_release_classes_keep_version_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new().entry(
        "META-INF/versions/11/a/b/Main.class",
        ClassFileBuilder::new("a/b/Main").build(),
    );
    let (input, output) = input(&tmp, &jar);

    relocate(&input, &output, &rules()).unwrap();

    let entries = read_jar(&output);
    let bytes = jar_entry(&entries, "META-INF/versions/11/x/y/Main.class").unwrap();
    assert_eq!(ClassFileView::parse(bytes).unwrap().this_class(), Some("x/y/Main"));
}

#[test]
fn malformed_class_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = JarBuilder::new().entry("a/b/Broken.class", b"\xCA\xFE\xBA\xBE\x00");
    let (input, output) = input(&tmp, &jar);

    let err = relocate(&input, &output, &rules()).unwrap_err();
    match err {
        RelocationError::MalformedClass { entry, .. } => assert_eq!(entry, "a/b/Broken.class"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_input_is_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let relocator = JarRelocator::new(
        tmp.path().join("missing.jar"),
        tmp.path().join("out.jar"),
        rules(),
    );
    assert!(matches!(relocator.run(), Err(RelocationError::Io { .. })));
}

#[test]
fn relocator_runs_once() {
    let tmp = tempfile::tempdir().unwrap();
    let (input, output) = input(&tmp, &JarBuilder::new().entry("a/b/x.txt", b"x"));
    let relocator = JarRelocator::new(input, output, rules());
    relocator.run().unwrap();
    assert!(matches!(relocator.run(), Err(RelocationError::AlreadyRun)));
}
