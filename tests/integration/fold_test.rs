//! Differential tests: synthesized automata against the sequential fold

use foldsynth::ir::Sort;
use foldsynth::{ExplorationMode, Session, SynthError, SynthesisConfig, Value, Z3Oracle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const MAX: &str = "|s: int, i: int| if i > s { i } else { s }";
const SUM: &str = "|s: int, i: int| s + i";
const LAST_SEEN: &str = "|s: int, i: (int, int)| i.0";
const ONLY_PUSHES: &str = "|s: bool, i: (int, int)| if s { i.0 == 0 } else { s }";
const OPEN_CLOSE: &str = "|s: (bool, int), i: (int, int)|
    if s.0 {
        if i.0 == 1 { (false, s.1) } else { (s.0, s.1 + 1) }
    } else {
        if i.0 == 0 { (true, 0) } else { (s.0, s.1) }
    }";
const OUTAGES: &str = "|s: (int, int), i: int| if i > s.0 + 120 { (i, s.1 + 1) } else { (i, s.1) }";

fn session(source: &str, config: SynthesisConfig) -> Session {
    Session::from_source(source, Z3Oracle::default(), config).expect("reducer should lower")
}

fn random_value(rng: &mut ChaCha8Rng, sort: &Sort) -> Value {
    match sort {
        Sort::Bool => Value::Bool(rng.random_bool(0.5)),
        Sort::Int => Value::Int(rng.random_range(-50..=50)),
        Sort::Tuple(fields) => Value::Tuple(fields.iter().map(|f| random_value(rng, f)).collect()),
    }
}

/// Github-style operations: an opcode in 0..5 and a timestamp
fn random_ops(rng: &mut ChaCha8Rng, len: usize) -> Vec<Value> {
    let mut time = 0;
    (0..len)
        .map(|_| {
            time += rng.random_range(0..100);
            Value::Tuple(vec![Value::Int(rng.random_range(0..5)), Value::Int(time)])
        })
        .collect()
}

fn random_inputs(session: &Session, rng: &mut ChaCha8Rng, len: usize) -> Vec<Value> {
    let sort = session.aggregation().input_sort(session.store()).clone();
    (0..len).map(|_| random_value(rng, &sort)).collect()
}

fn random_initial(session: &Session, rng: &mut ChaCha8Rng) -> Value {
    let sort = session.aggregation().state_sort(session.store()).clone();
    random_value(rng, &sort)
}

fn assert_agrees(session: &mut Session, initial: &Value, inputs: &[Value]) {
    let expected = session.fold_sequential(initial, inputs).unwrap();
    let actual = session.fold(initial, inputs).unwrap();
    assert_eq!(actual, expected, "inputs {:?} from {}", inputs, initial);
}

#[test]
fn test_max_example() {
    let mut session = session(MAX, SynthesisConfig::default());
    let inputs: Vec<Value> = [3, 1, 4, 1, 5].into_iter().map(Value::Int).collect();
    assert_eq!(session.fold(&Value::Int(0), &inputs).unwrap(), Value::Int(5));
    // The initial state plus one self-looping shape
    assert_eq!(session.registry().len(), 2);
    assert!(session.automaton().to_string().contains("Z1(g0)"));
}

#[test]
fn test_differential_scalar_reducers() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for source in [MAX, SUM, LAST_SEEN] {
        let mut session = session(source, SynthesisConfig::default());
        for len in [0, 1, 2, 5, 17, 40] {
            let inputs = random_inputs(&session, &mut rng, len);
            let initial = random_initial(&session, &mut rng);
            assert_agrees(&mut session, &initial, &inputs);
        }
        assert!(session.registry().len() <= 3, "{}", session.automaton());
    }
}

#[test]
fn test_differential_only_pushes() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut session = session(ONLY_PUSHES, SynthesisConfig::default());
    for len in [0, 1, 3, 10, 30] {
        let inputs = random_ops(&mut rng, len);
        for initial in [Value::Bool(true), Value::Bool(false)] {
            assert_agrees(&mut session, &initial, &inputs);
        }
    }
    // All pushes keep the flag
    let pushes: Vec<Value> = (0..4)
        .map(|t| Value::Tuple(vec![Value::Int(0), Value::Int(t)]))
        .collect();
    assert_eq!(session.fold(&Value::Bool(true), &pushes).unwrap(), Value::Bool(true));
}

#[test]
fn test_partitioned_fold_matches_sequential() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for source in [MAX, SUM, ONLY_PUSHES] {
        let mut session = session(source, SynthesisConfig::default());
        for _ in 0..4 {
            let inputs = if source == ONLY_PUSHES {
                random_ops(&mut rng, 24)
            } else {
                random_inputs(&session, &mut rng, 24)
            };
            let initial = random_initial(&session, &mut rng);
            let parts = rng.random_range(1..=6);
            let chunks: Vec<&[Value]> = inputs.chunks(inputs.len().div_ceil(parts)).collect();
            let expected = session.fold_sequential(&initial, &inputs).unwrap();
            assert_eq!(session.fold_partitioned(&initial, &chunks).unwrap(), expected);
        }
    }
}

#[test]
fn test_ahead_of_time_matches_lazy() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let config = SynthesisConfig::default().with_mode(ExplorationMode::AheadOfTime);
    let mut eager = session(MAX, config);
    let mut lazy = session(MAX, SynthesisConfig::default());
    assert_eq!(eager.registry().unresolved().count(), 0);
    for _ in 0..5 {
        let inputs = random_inputs(&lazy, &mut rng, 12);
        let initial = random_initial(&lazy, &mut rng);
        assert_eq!(
            eager.fold(&initial, &inputs).unwrap(),
            lazy.fold(&initial, &inputs).unwrap()
        );
    }
    assert_eq!(eager.registry().len(), lazy.registry().len());
}

fn random_times(rng: &mut ChaCha8Rng, len: usize) -> Vec<Value> {
    let mut time = 0;
    (0..len)
        .map(|_| {
            time += rng.random_range(0..250);
            Value::Int(time)
        })
        .collect()
}

#[test]
fn test_open_close_automaton_is_small_and_complete() {
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    let mut lazy = session(OPEN_CLOSE, SynthesisConfig::default());
    for len in [0, 1, 4, 8, 16, 32] {
        let inputs = random_ops(&mut rng, len);
        let initial = random_initial(&lazy, &mut rng);
        assert_agrees(&mut lazy, &initial, &inputs);
    }
    assert!(lazy.registry().len() <= 12, "{}", lazy.automaton());

    let config = SynthesisConfig::default().with_mode(ExplorationMode::AheadOfTime);
    let mut eager = session(OPEN_CLOSE, config);
    assert_eq!(eager.registry().unresolved().count(), 0);
    assert!(eager.registry().len() <= 12, "{}", eager.automaton());
    let inputs = random_ops(&mut rng, 24);
    assert_agrees(&mut eager, &Value::Tuple(vec![Value::Bool(true), Value::Int(3)]), &inputs);
}

#[test]
fn test_outage_counter_automaton_is_small() {
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let mut session = session(OUTAGES, SynthesisConfig::default());
    for len in [0, 1, 4, 8, 16, 32] {
        let inputs = random_times(&mut rng, len);
        let initial = random_initial(&session, &mut rng);
        assert_agrees(&mut session, &initial, &inputs);
    }
    assert!(session.registry().len() <= 8, "{}", session.automaton());
}

#[test]
fn test_rejects_unsupported_reducers() {
    for source in [
        "|s: int, i: int| s.max(i)",
        "|s: String, i: int| s",
        "|s: int, i: bool| \"text\"",
    ] {
        assert!(matches!(
            Session::from_source(source, Z3Oracle::default(), SynthesisConfig::default()),
            Err(SynthError::UnsupportedExpression(_))
        ));
    }
    assert!(matches!(
        Session::from_source("|s: int, i: int| s +", Z3Oracle::default(), SynthesisConfig::default()),
        Err(SynthError::Parse(_))
    ));
}
