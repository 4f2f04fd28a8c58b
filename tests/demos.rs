mod common;

use std::{
    path::{Path, PathBuf},
    process::Output,
};

use bon::Builder;
use common::*;
use escargot::CargoBuild;

use mp4_rewrite::{AtomKind, Mp4File};

#[derive(Builder)]
struct DemoRun<'a> {
    demo: &'static str,
    input: &'a Path,
    output: Option<&'a Path>,
    #[builder(default)]
    additional_args: Vec<&'static str>,
}

impl DemoRun<'_> {
    fn run(self) -> Output {
        let mut command = CargoBuild::new()
            .example(self.demo)
            .run()
            .expect("error building demo")
            .command();
        command.arg(self.input);
        if let Some(output) = self.output {
            command.arg(output);
        }
        let output = command
            .args(self.additional_args)
            .output()
            .expect("failed to run demo");
        assert!(
            output.status.success(),
            "{} failed: {}",
            self.demo,
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }
}

/// A file with `moov` after `mdat`, written to `dir`
fn input_file(dir: &Path) -> PathBuf {
    let payload_start = (ftyp().len() + 8) as u64;
    let data = [
        ftyp(),
        mdat(&[0x11; 128]),
        moov(
            &[Track::audio(1, vec![payload_start, payload_start + 64])],
            &[udta_with_title("Demo")],
        ),
    ]
    .concat();
    let path = dir.join("input.mp4");
    std::fs::write(&path, data).expect("error writing input file");
    path
}

fn root_kinds(file: &Mp4File) -> Vec<AtomKind> {
    let tree = file.tree();
    tree.roots().iter().map(|id| tree[*id].kind()).collect()
}

#[test]
fn mp4dump_prints_tree_and_tracks() {
    let dir = tempfile::tempdir().expect("error creating temp dir");
    let input = input_file(dir.path());

    let output = DemoRun::builder()
        .demo("mp4dump")
        .input(&input)
        .build()
        .run();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("moov"), "{stdout}");
    assert!(stdout.contains("stco"), "{stdout}");
    assert!(stdout.contains("track 1: Audio"), "{stdout}");
    assert!(stdout.contains("title: Demo"), "{stdout}");
}

#[test]
fn mp4optimize_writes_faststart_file() {
    let dir = tempfile::tempdir().expect("error creating temp dir");
    let input = input_file(dir.path());
    let target = dir.path().join("optimized.mp4");

    DemoRun::builder()
        .demo("mp4optimize")
        .input(&input)
        .output(&target)
        .additional_args(vec!["--no-padding"])
        .build()
        .run();

    let file = Mp4File::open(&target).expect("error parsing output");
    assert_eq!(
        root_kinds(&file),
        vec![AtomKind::FileType, AtomKind::Movie, AtomKind::MediaData]
    );
    assert_eq!(file.title(), Some("Demo"));
}

#[test]
fn mp4save_sets_title_in_place() {
    let dir = tempfile::tempdir().expect("error creating temp dir");
    let input = input_file(dir.path());

    DemoRun::builder()
        .demo("mp4save")
        .input(&input)
        .additional_args(vec!["--title", "Renamed"])
        .build()
        .run();

    let file = Mp4File::open(&input).expect("error parsing output");
    assert_eq!(file.title(), Some("Renamed"));
    assert_eq!(
        root_kinds(&file),
        vec![AtomKind::FileType, AtomKind::MediaData, AtomKind::Movie]
    );
}

#[test]
fn mp4save_rebrands_into_new_file() {
    let dir = tempfile::tempdir().expect("error creating temp dir");
    let input = input_file(dir.path());
    let target = dir.path().join("output.m4v");

    DemoRun::builder()
        .demo("mp4save")
        .input(&input)
        .output(&target)
        .additional_args(vec!["--m4v"])
        .build()
        .run();

    let file = Mp4File::open(&target).expect("error parsing output");
    let tree = file.tree();
    let ftyp = tree[tree.file_type().expect("no ftyp")]
        .data()
        .as_file_type()
        .expect("ftyp not decoded");
    assert_eq!(ftyp.major_brand, *b"M4V ");
}
