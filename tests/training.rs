//! End-to-end training runs on a small generated corpus.

use std::io::Write;

use paravec::layer::Layer;
use paravec::schedule::Schedule;
use paravec::{Corpus, Model, ModelKind, Role, TrainConfig, Trainer};
use tempfile::NamedTempFile;

const ANIMALS: &[&str] = &["cat", "dog", "horse", "cow", "sheep", "goat"];
const TOOLS: &[&str] = &["hammer", "saw", "drill", "wrench", "chisel", "file"];

/// Lines alternate between two topics so that there is something to learn.
fn write_corpus(lines: usize) -> (NamedTempFile, Corpus) {
    let mut f = NamedTempFile::new().unwrap();
    for i in 0..lines {
        let topic = if i % 2 == 0 { ANIMALS } else { TOOLS };
        let words: Vec<&str> = (0..8).map(|k| topic[(i * 7 + k * 3) % topic.len()]).collect();
        writeln!(f, "the {} and the {}", words[..4].join(" "), words[4..].join(" ")).unwrap();
    }
    f.flush().unwrap();
    let corpus = Corpus::open(f.path()).unwrap();
    (f, corpus)
}

fn config(model: ModelKind) -> TrainConfig {
    TrainConfig {
        model,
        dim: 16,
        window: 3,
        sample: 0.0,
        hs: true,
        negative: 4,
        threads: 3,
        epochs: 3,
        min_count: 1,
        negative_table_size: 100_000,
        progress: false,
        ..TrainConfig::default()
    }
}

fn snapshot(model: &Model, role: Role) -> Vec<f32> {
    model.table(role).unwrap().to_vec()
}

fn check_training(config: TrainConfig) -> Model {
    let (_f, corpus) = write_corpus(120);
    let mut model = Model::build(config, &corpus).unwrap();
    let words = snapshot(&model, Role::Words);
    let stats = Trainer::new(&mut model).train(&corpus).unwrap();

    assert!(stats.contexts > 0);
    assert!(stats.samples > 0);
    let err = stats.mean_error();
    assert!(err > 0.0 && err < 1.0, "mean error {err}");
    for table in model.layers().iter().filter_map(Layer::as_table) {
        assert!(table.to_vec().iter().all(|x| x.is_finite()), "{:?}", table.role());
    }
    let trained = snapshot(&model, Role::Words);
    assert_ne!(trained, words);
    model
}

#[test]
fn cbow() {
    let model = check_training(config(ModelKind::Cbow));
    assert!(model.paragraphs().is_none());
    assert_eq!(model.vocab().at(0).symbol, "</s>");
}

#[test]
fn skipgram_negative_sampling_only() {
    check_training(TrainConfig {
        hs: false,
        ..config(ModelKind::Skipgram)
    });
}

#[test]
fn skipgram_hierarchical_softmax_only() {
    let model = check_training(TrainConfig {
        negative: 0,
        ..config(ModelKind::Skipgram)
    });
    assert!(model.table(Role::NegativeSampling).is_none());
}

#[test]
fn pvdm() {
    let (_f, corpus) = write_corpus(120);
    let mut model = Model::build(config(ModelKind::Pvdm), &corpus).unwrap();
    assert_eq!(model.paragraphs().unwrap().len(), 120);
    let before = snapshot(&model, Role::Paragraphs);
    Trainer::new(&mut model).train(&corpus).unwrap();
    let after = snapshot(&model, Role::Paragraphs);
    // every paragraph took part
    for (a, b) in before.chunks(16).zip(after.chunks(16)) {
        assert_ne!(a, b);
    }
}

#[test]
fn pvdm_concat() {
    let model = check_training(TrainConfig {
        concat: true,
        ..config(ModelKind::Pvdm)
    });
    assert_eq!(model.table(Role::HierarchicalSoftmax).unwrap().cols(), 16 * 4);
}

/// `lines` lines spread over three labels; `rare` appends a word seen once.
fn write_labeled_corpus(lines: usize, rare: bool) -> (NamedTempFile, Corpus) {
    let mut f = NamedTempFile::new().unwrap();
    for i in 0..lines {
        let topic = if i % 3 == 0 { ANIMALS } else { TOOLS };
        let label = format!("doc{}", i % 3);
        let words: Vec<&str> = (0..6).map(|k| topic[(i + k) % topic.len()]).collect();
        if rare {
            writeln!(f, "{label} {} once{i}", words.join(" ")).unwrap();
        } else {
            writeln!(f, "{label} {}", words.join(" ")).unwrap();
        }
    }
    f.flush().unwrap();
    let corpus = Corpus::open(f.path()).unwrap();
    (f, corpus)
}

#[test]
fn pvdbow_with_labels() {
    let (_f, corpus) = write_labeled_corpus(60, false);

    let c = TrainConfig {
        labels: true,
        ..config(ModelKind::Pvdbow)
    };
    let mut model = Model::build(c, &corpus).unwrap();
    let paragraphs = model.paragraphs().unwrap();
    assert_eq!(paragraphs.len(), 3);
    assert!(model.vocab().lookup("doc0").is_none());
    let stats = Trainer::new(&mut model).train(&corpus).unwrap();
    assert_eq!(stats.contexts, 3 * 60 * 6);
}

#[test]
fn other_schedules() {
    for schedule in [Schedule::Interval, Schedule::Decay { factor: 0.2 }, Schedule::Bold] {
        check_training(TrainConfig {
            schedule,
            threads: 1,
            ..config(ModelKind::Cbow)
        });
    }
}

#[test]
fn infer_leaves_model_unchanged() {
    let (_f, corpus) = write_corpus(80);
    let mut model = Model::build(config(ModelKind::Pvdbow), &corpus).unwrap();
    Trainer::new(&mut model).train(&corpus).unwrap();
    let words = snapshot(&model, Role::Words);
    let paragraphs = snapshot(&model, Role::Paragraphs);

    let (_g, new) = write_corpus(10);
    let vectors = Trainer::new(&mut model).infer(&new).unwrap();
    assert_eq!(vectors.len(), 10);
    assert!(vectors.iter().all(|v| v.len() == 16 && v.iter().all(|x| x.is_finite())));
    assert_eq!(snapshot(&model, Role::Words), words);
    assert_eq!(snapshot(&model, Role::Paragraphs), paragraphs);
    assert!(!model.table(Role::Words).unwrap().is_frozen());
}

#[test]
fn infer_after_load_keeps_labels_and_unknown_words() {
    let dir = tempfile::tempdir().unwrap();
    let (_f, corpus) = write_labeled_corpus(60, true);
    let c = TrainConfig {
        labels: true,
        replace_unknown: true,
        min_count: 2,
        negative: 0,
        ..config(ModelKind::Pvdbow)
    };
    let mut model = Model::build(c, &corpus).unwrap();
    assert_eq!(model.vocab().lookup("<unk>").unwrap().count, 60);
    Trainer::new(&mut model).train(&corpus).unwrap();
    let path = dir.path().join("model.txt");
    model.save(&path).unwrap();

    let mut back = Model::load(&path).unwrap();
    assert!(back.config().labels);
    assert!(back.config().replace_unknown);
    let (_g, new) = write_labeled_corpus(30, true);
    let vectors = Trainer::new(&mut back).infer(&new).unwrap();
    assert_eq!(vectors.len(), 3);
}

#[test]
fn infer_keeps_caller_frozen_tables() {
    let (_f, corpus) = write_corpus(40);
    let mut model = Model::build(config(ModelKind::Pvdm), &corpus).unwrap();
    model.table_mut(Role::Words).unwrap().set_frozen(true);
    let (_g, new) = write_corpus(5);
    Trainer::new(&mut model).infer(&new).unwrap();
    assert!(model.table(Role::Words).unwrap().is_frozen());
    assert!(!model.table(Role::NegativeSampling).unwrap().is_frozen());
}

#[test]
fn infer_needs_paragraph_model() {
    let (_f, corpus) = write_corpus(10);
    let mut model = Model::build(config(ModelKind::Cbow), &corpus).unwrap();
    assert!(Trainer::new(&mut model).infer(&corpus).is_err());
}

#[test]
fn trained_model_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let model = check_training(config(ModelKind::Pvdm));
    let path = dir.path().join("model.txt");
    model.save(&path).unwrap();
    let back = Model::load(&path).unwrap();

    assert_eq!(back.kind(), ModelKind::Pvdm);
    assert_eq!(back.vocab().len(), model.vocab().len());
    for role in [Role::Words, Role::Paragraphs, Role::HierarchicalSoftmax, Role::NegativeSampling] {
        let a: Vec<u32> = snapshot(&model, role).iter().map(|x| x.to_bits()).collect();
        let b: Vec<u32> = snapshot(&back, role).iter().map(|x| x.to_bits()).collect();
        assert_eq!(a, b, "{role:?}");
    }
}

#[test]
fn vocabulary_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (_f, corpus) = write_corpus(40);
    let model = Model::build(config(ModelKind::Cbow), &corpus).unwrap();
    let path = dir.path().join("vocab.txt");
    model.vocab().save(&path).unwrap();

    let vocab = paravec::Vocabulary::load(&path).unwrap();
    let rebuilt = Model::build_with_vocab(config(ModelKind::Cbow), vocab, &corpus).unwrap();
    let a: Vec<(&str, u64)> = model.vocab().iter().map(|e| (e.symbol.as_str(), e.count)).collect();
    let b: Vec<(&str, u64)> = rebuilt.vocab().iter().map(|e| (e.symbol.as_str(), e.count)).collect();
    assert_eq!(a, b);
}
