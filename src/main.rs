//! The romark command-line tool: inspect a ROM image through its
//! annotation metadata.

#![deny(unused)]
#![deny(warnings)]
#![deny(unsafe_code)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use romark::delta::Delta;
use romark::meta::Metadata;
use romark::model::Model;
use romark::rom::Rom;
use romark::run::Run;
use romark::run::RunKind;

#[derive(StructOpt)]
#[structopt(name = "romark", about = "Annotate console ROM images.")]
enum Cli {
  /// Prints the annotated run map of an image.
  Map {
    /// The ROM image to load.
    #[structopt(parse(from_os_str))]
    rom: PathBuf,
    /// The metadata file describing its annotations.
    #[structopt(parse(from_os_str))]
    meta: PathBuf,
  },
  /// Lists every anchor with its address and format.
  Anchors {
    /// The ROM image to load.
    #[structopt(parse(from_os_str))]
    rom: PathBuf,
    /// The metadata file describing its annotations.
    #[structopt(parse(from_os_str))]
    meta: PathBuf,
  },
  /// Checks that metadata loads cleanly and round-trips losslessly.
  Verify {
    /// The ROM image to load.
    #[structopt(parse(from_os_str))]
    rom: PathBuf,
    /// The metadata file describing its annotations.
    #[structopt(parse(from_os_str))]
    meta: PathBuf,
  },
}

fn main() {
  match Cli::from_args() {
    Cli::Map { rom, meta } => {
      let model = load(&rom, &meta);
      for run in model.runs().iter() {
        print_run(&model, run);
      }
    }
    Cli::Anchors { rom, meta } => {
      let model = load(&rom, &meta);
      for (addr, name, format) in model.anchors().anchors() {
        if format.is_empty() {
          println!("{:06x} ^{}", addr, name);
        } else {
          println!("{:06x} ^{}{}", addr, name, format);
        }
      }
    }
    Cli::Verify { rom, meta } => {
      let model = load(&rom, &meta);
      let collected = Metadata::collect(&model);
      let text = match collected.to_string() {
        Ok(text) => text,
        Err(e) => die(&format!("could not re-serialize metadata: {}", e)),
      };
      if Metadata::from_str(&text).is_err() {
        die("re-serialized metadata does not parse");
      }
      println!(
        "ok: {} anchors, {} runs",
        model.anchors().len(),
        model.runs().len()
      );
    }
  }
}

/// Loads an image and replays its metadata, dying noisily on failure.
fn load(rom_path: &Path, meta_path: &Path) -> Model {
  let bytes = match fs::read(rom_path) {
    Ok(bytes) => bytes,
    Err(e) => die(&format!("could not read {}: {}", rom_path.display(), e)),
  };
  let meta_text = match fs::read_to_string(meta_path) {
    Ok(text) => text,
    Err(e) => die(&format!("could not read {}: {}", meta_path.display(), e)),
  };
  let meta = match Metadata::from_str(&meta_text) {
    Ok(meta) => meta,
    Err(e) => die(&format!("could not parse {}: {}", meta_path.display(), e)),
  };

  let mut model = Model::new(Rom::from_bytes(bytes));
  let mut delta = Delta::new();
  if let Err(errors) = meta.apply(&mut model, &mut delta) {
    errors.dump_and_die(2);
  }
  model
}

fn print_run(model: &Model, run: &Run) {
  let name = match model.anchors().name_of(run.start()) {
    Some(name) => format!(" ^{}", name),
    None => String::new(),
  };
  println!(
    "{:06x} +{:<6} {}{}",
    run.start(),
    run.length(),
    describe(run.kind()),
    name
  );
}

fn describe(kind: &RunKind) -> String {
  match kind {
    RunKind::Byte => "byte".into(),
    RunKind::Pointer { dest } if dest.is_null() => "pointer -> (null)".into(),
    RunKind::Pointer { dest } => format!("pointer -> {:08x}", dest.to_u32()),
    RunKind::Text { terminated: true } => "text (terminated)".into(),
    RunKind::Text { terminated: false } => "text".into(),
    RunKind::Array { segments, count } => {
      format!("array of {} x {} segments", count, segments.len())
    }
    RunKind::LzSprite {
      depth,
      tile_width,
      tile_height,
      ..
    } => format!(
      "lz sprite {}bpp {}x{} tiles",
      depth, tile_width, tile_height
    ),
    RunKind::LzPalette => "lz palette".into(),
    RunKind::Sprite {
      depth,
      tile_width,
      tile_height,
      ..
    } => format!("sprite {}bpp {}x{} tiles", depth, tile_width, tile_height),
    RunKind::Palette => "palette".into(),
    RunKind::Stream { end } => format!("stream (until {:#04x})", end),
  }
}

fn die(message: &str) -> ! {
  eprintln!("error: {}", message);
  process::exit(1)
}
