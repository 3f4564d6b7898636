//! Property-based test generators using proptest.

use crate::fixtures::{company_input, office_input};
use entimap_codec::Value;
use proptest::prelude::*;

/// Strategy for short human-readable descriptions.
pub fn description_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 ]{0,15}").expect("valid regex")
}

/// Strategy for scalar values of every non-container kind.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e6..1.0e6f64).prop_map(Value::Float),
        description_strategy().prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

/// Strategy for office inputs with up to `max_addresses` addresses.
pub fn office_strategy(max_addresses: usize) -> impl Strategy<Value = Value> {
    (
        description_strategy(),
        prop::collection::vec(description_strategy(), 0..=max_addresses),
    )
        .prop_map(|(description, addresses)| {
            let addresses: Vec<&str> = addresses.iter().map(String::as_str).collect();
            office_input(&description, &addresses)
        })
}

/// Strategy for whole company inputs.
pub fn company_strategy(max_offices: usize, max_addresses: usize) -> impl Strategy<Value = Value> {
    (
        description_strategy(),
        prop::collection::vec(office_strategy(max_addresses), 0..=max_offices),
    )
        .prop_map(|(name, offices)| company_input(&name, offices))
}
