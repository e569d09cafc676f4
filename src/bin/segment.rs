//! Segment German text into sentences from the command line
//!
//! Usage:
//!   cargo run --bin segment -- "Das ist ein Satz. Und noch einer!"
//!   echo "Er kam um 14.30 Uhr. Dann ging er." | cargo run --bin segment
//!   cargo run --bin segment -- --json "Hallo. Tschüss."
//!
//! Prints one sentence per line, or a JSON array with `--json`.

use anyhow::{Context, Result};
use lerndeutsch::segmentation;
use std::io::Read;

fn main() -> Result<()> {
    let mut json = false;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else {
            words.push(arg);
        }
    }

    let text = if words.is_empty() {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        input
    } else {
        words.join(" ")
    };

    let sentences = segmentation::segment(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&sentences)?);
    } else {
        for sentence in &sentences {
            println!("{}", sentence);
        }
    }

    Ok(())
}
