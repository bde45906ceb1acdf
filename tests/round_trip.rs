use std::{collections::HashMap, sync::Arc, thread};

use hindi_tokenizer::{
    DecodeError, FormatError, ModelError, Token, TokenPair, Tokenizer, TrainerConfig,
};
use tempfile::TempDir;

const CORPUS: &[&str] = &[
    "भारत एक विशाल देश है। इसकी राजधानी नई दिल्ली है।",
    "हिंदी भारत की राजभाषा है और करोड़ों लोग हिंदी बोलते हैं।",
    "आज मौसम बहुत अच्छा है, चलो बाहर घूमने चलते हैं!",
    "मैंने 2024 में १२५ किताबें पढ़ीं।",
    "वह रोज़ सुबह योग करता है और फिर office जाता है।",
    "क्या आप मेरी मदद कर सकते हैं? धन्यवाद।",
    "दिल्ली, मुंबई, कोलकाता और चेन्नई बड़े शहर हैं।",
    "बच्चे स्कूल में खेल रहे हैं।\nशिक्षक उन्हें देख रहे हैं।",
];

const SAMPLES: &[&str] = &[
    "",
    " ",
    "नमस्ते",
    "भारत एक विशाल देश है।",
    "I'm learning हिंदी in 2024!",
    "  leading and trailing  ",
    "पंक्ति एक\r\nपंक्ति दो\n\n\tटैब",
    "emoji 🙏 and 中文 mixed with देवनागरी ॐ",
    "\u{0}\u{7f}control",
];

fn trained(vocab_size: usize) -> Tokenizer {
    hindi_tokenizer::train(CORPUS, vocab_size).expect("training succeeds")
}

#[test]
fn decode_inverts_encode() {
    let model = trained(400);
    for &text in SAMPLES {
        let ids = hindi_tokenizer::encode(&model, text).expect("encodable");
        assert_eq!(
            hindi_tokenizer::decode(&model, &ids).expect("decodable"),
            text,
            "round trip of {text:?}"
        );
    }
}

#[test]
fn encoding_never_expands_bytes() {
    let model = trained(400);
    for &text in SAMPLES.iter().chain(CORPUS) {
        let ids = model.encode(text).expect("encodable");
        assert!(ids.len() <= text.len(), "{text:?}");
    }
}

#[test]
fn reencoding_is_idempotent() {
    let model = trained(400);
    for &text in CORPUS {
        let ids = model.encode(text).expect("encodable");
        let again = model
            .encode(&model.decode(&ids).expect("decodable"))
            .expect("encodable");
        assert_eq!(ids, again);
    }
}

#[test]
fn training_compresses_seen_text() {
    let model = trained(400);
    let text = CORPUS[0];
    let ids = model.encode(text).expect("encodable");
    assert!(ids.len() * 4 < text.len() * 3);
}

#[test]
fn vocabulary_is_bounded_and_ids_are_monotonic() {
    let model = trained(300);
    assert!(model.vocab_size() <= 300);
    for (rank, &TokenPair(left, right)) in model.merges().iter().enumerate() {
        let id = 256 + rank;
        assert!(left < id && right < id, "merge {rank} refers forward");
        let mut expected = model.token_bytes(left).expect("known").to_vec();
        expected.extend_from_slice(model.token_bytes(right).expect("known"));
        assert_eq!(model.token_bytes(id), Some(expected.as_slice()));
    }
}

#[test]
fn training_is_independent_of_corpus_order() {
    let mut reversed = CORPUS.to_vec();
    reversed.reverse();
    let forward = trained(350);
    let backward = hindi_tokenizer::train(reversed.as_slice(), 350).expect("training succeeds");
    assert_eq!(forward.merges(), backward.merges());
}

#[test]
fn repeated_pair_example() {
    let corpus = ["aa"; 4];
    let model = hindi_tokenizer::train(corpus.as_slice(), 257).expect("training succeeds");
    assert_eq!(model.merges(), &[TokenPair(97, 97)]);
    assert_eq!(model.encode("aaaa").expect("encodable"), vec![256, 256]);
    assert_eq!(model.decode(&[256, 256]).expect("decodable"), "aaaa");
}

#[test]
fn empty_input() {
    let model = trained(300);
    assert_eq!(model.encode("").expect("encodable"), Vec::<Token>::new());
    assert_eq!(model.decode(&[]).expect("decodable"), "");
}

#[test]
fn unknown_id_on_500_token_model() {
    // a chain of 244 merges: "aa", "aaa", "aaaa", ...
    let merges = std::iter::once((97, 97)).chain((256..499).map(|id| (id, 97)));
    let model = Tokenizer::with_default_pattern(merges).expect("valid merges");
    assert_eq!(model.vocab_size(), 500);
    assert!(matches!(
        model.decode(&[999_999]),
        Err(DecodeError::UnknownToken(999_999))
    ));
    assert!(matches!(model.decode(&[500]), Err(DecodeError::UnknownToken(500))));
    assert_eq!(model.decode(&[499]).expect("decodable"), "a".repeat(245));
}

#[test]
fn small_vocab_is_rejected() {
    let result = hindi_tokenizer::train(CORPUS, 256);
    assert!(matches!(
        result,
        Err(hindi_tokenizer::TrainError::VocabTooSmall(256))
    ));
}

#[test]
fn min_pair_freq_limits_merges() {
    let strict = Tokenizer::train(CORPUS, &TrainerConfig::new(2000).min_pair_freq(10))
        .expect("training succeeds");
    let loose = Tokenizer::train(CORPUS, &TrainerConfig::new(2000)).expect("training succeeds");
    assert!(strict.merges().len() < loose.merges().len());
    assert!(loose.vocab_size() < 2000);
}

#[test]
fn saved_model_behaves_identically() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("hindi.model");
    let model = trained(400);

    hindi_tokenizer::save(&model, &path).expect("save succeeds");
    let loaded = hindi_tokenizer::load(&path).expect("load succeeds");

    assert_eq!(loaded.vocab_size(), model.vocab_size());
    assert_eq!(loaded.pattern(), model.pattern());
    for &text in SAMPLES.iter().chain(CORPUS) {
        let ids = model.encode(text).expect("encodable");
        assert_eq!(loaded.encode(text).expect("encodable"), ids);
        assert_eq!(loaded.decode(&ids).expect("decodable"), text);
    }
}

#[test]
fn loading_absent_model_is_a_format_error() {
    let dir = TempDir::new().expect("temp dir");
    let result = hindi_tokenizer::load(dir.path().join("missing.model"));
    assert!(matches!(
        result,
        Err(ModelError::Format(FormatError::MissingFile(_)))
    ));
}

#[test]
fn vocab_listing_is_written() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("hindi.vocab");
    let model = trained(300);

    model.save_vocab(&path).expect("listing written");
    let listing = std::fs::read_to_string(&path).expect("readable");
    assert_eq!(listing.lines().count(), model.vocab_size());
    assert!(listing.lines().nth(256).is_some_and(|l| l.ends_with(" 256")));
}

#[test]
fn batch_matches_sequential() {
    let model = trained(400);
    let batch = model.encode_batch(CORPUS, false).expect("encodable");
    for (text, ids) in CORPUS.iter().zip(&batch) {
        assert_eq!(&model.encode(text).expect("encodable"), ids);
    }
    let decoded = model.decode_batch(&batch, false).expect("decodable");
    assert_eq!(decoded, CORPUS);
}

#[test]
fn model_is_shared_across_threads() {
    let model = Arc::new(trained(400));
    let expected: Vec<Vec<Token>> = CORPUS
        .iter()
        .map(|t| model.encode(t).expect("encodable"))
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let model = Arc::clone(&model);
            thread::spawn(move || {
                CORPUS
                    .iter()
                    .map(|t| model.encode(t).expect("encodable"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("thread finishes"), expected);
    }
}

#[test]
fn megabyte_runs_encode_and_round_trip() {
    let model = trained(300);
    for text in [
        "x".repeat(2_000_000),
        format!("a{}b", " ".repeat(2_000_000)),
        format!("{}\n", " \t".repeat(1_000_000)),
        format!("भारत{}", "ा".repeat(400_000)),
    ] {
        let ids = model.encode(&text).expect("long runs segment");
        assert!(ids.len() <= text.len());
        assert_eq!(model.decode(&ids).expect("decodable"), text);
    }
}

#[test]
fn minbpe_model_file_loads() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("hindi_tokenizer.model");
    let pattern = r#"\s?[ऀ-ॿ]+|[\d]{1,3}|\s?[a-zA-Z]+|[^\s\wऀ-ॿ]|\s+(?!\S)|\s+"#;
    std::fs::write(&path, format!("minbpe v1\n{pattern}\n0\n224 164\n")).expect("writable");

    let model = hindi_tokenizer::load(&path).expect("compatible model loads");
    assert_eq!(model.vocab_size(), 257);
    let ids = model.encode("नमन  ok").expect("encodable");
    assert_eq!(model.decode(&ids).expect("decodable"), "नमन  ok");
}

#[test]
fn decode_range_ends_at_vocab_size_with_special_tokens() {
    let model = trained(300)
        .with_special_tokens(HashMap::from([("<|endoftext|>".to_owned(), 100_257)]))
        .expect("special token above merge range");
    assert_eq!(model.vocab_size(), 100_258);
    assert_eq!(model.decode(&[100_257]).expect("decodable"), "<|endoftext|>");
    let size = model.vocab_size();
    assert!(matches!(
        model.decode(&[size]),
        Err(DecodeError::UnknownToken(id)) if id == size
    ));
}
