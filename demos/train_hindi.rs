//! Trains a small tokenizer on the bundled Hindi sample, saves and reloads it,
//! and shows how a few sentences are split into tokens.
//!
//! ```text
//! cargo run --example train_hindi
//! RUST_LOG=debug cargo run --example train_hindi   # one line per merge
//! ```

use std::error::Error;

use env_logger::Env;
use hindi_tokenizer::{Tokenizer, TrainerConfig};

const SAMPLE: &str = include_str!("data/hindi_sample.txt");

fn main() -> Result<(), Box<dyn Error>> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    let _ = builder.try_init();

    let corpus: Vec<&str> = SAMPLE.lines().filter(|l| !l.trim().is_empty()).collect();
    let config = TrainerConfig::new(600).show_progress(true);
    let tokenizer = Tokenizer::train(corpus.as_slice(), &config)?;

    let dir = std::env::temp_dir();
    let model_path = dir.join("hindi_demo.model");
    let vocab_path = dir.join("hindi_demo.vocab");
    tokenizer.save(&model_path)?;
    tokenizer.save_vocab(&vocab_path)?;
    let reloaded = hindi_tokenizer::load(&model_path)?;
    println!(
        "model: {} ({} tokens), listing: {}",
        model_path.display(),
        reloaded.vocab_size(),
        vocab_path.display()
    );

    for text in [
        "भारत एक विशाल देश है।",
        "हिंदी देवनागरी लिपि में लिखी जाती है।",
        "मैं 2024 में office गया।",
    ] {
        let ids = reloaded.encode(text)?;
        let pieces: Vec<String> = ids
            .iter()
            .map(|&id| {
                reloaded
                    .token_bytes(id)
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default()
            })
            .collect();
        let round_trip = reloaded.decode(&ids)? == text;

        println!();
        println!("text:       {text}");
        println!("ids:        {ids:?}");
        println!("pieces:     {pieces:?}");
        println!(
            "compressed: {} bytes -> {} tokens, round trip {}",
            text.len(),
            ids.len(),
            if round_trip { "ok" } else { "FAILED" }
        );
    }

    Ok(())
}
