#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weft_core::{Value, patch};

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FuzzValue>),
    Map(Vec<(String, FuzzValue)>),
}

impl FuzzValue {
    fn build(&self, depth: usize) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(*n),
            Self::Text(s) => Value::Text(s.clone()),
            Self::List(_) | Self::Map(_) if depth == 0 => Value::Null,
            Self::List(items) => Value::list(items.iter().take(16).map(|v| v.build(depth - 1))),
            Self::Map(entries) => Value::map(
                entries
                    .iter()
                    .take(16)
                    .map(|(k, v)| (k.clone(), v.build(depth - 1))),
            ),
        }
    }
}

fuzz_target!(|input: (FuzzValue, FuzzValue)| {
    let mut target = input.0.build(4);
    let source = input.1.build(4);
    let before = target.clone();

    let changed = patch(&mut target, &source);
    if before != Value::Null {
        assert_eq!(target.shape(), before.shape(), "only null adopts a new shape");
    }
    if !changed {
        assert_eq!(target, before);
    }
    // Idempotent: applying the same source again changes nothing.
    assert!(!patch(&mut target, &source));
});
