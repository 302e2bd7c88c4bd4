// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use hex_literal::hex;
use state_hub_rs::uuid7::{GenState, SEED_LEN, Uuid7};

fn fixed_seed() -> [u8; SEED_LEN] {
    let mut seed = [0u8; SEED_LEN];
    let pattern = hex!("00112233445566778899aabbccddeeff");
    for (i, b) in seed.iter_mut().enumerate().skip(6) {
        *b = pattern[i % pattern.len()];
    }
    seed
}

#[test]
fn test_layout_bits() {
    let state = GenState::new(fixed_seed(), 0);
    let u = state.mint_at(0x018f_1234_5678, 0x0ABC);

    assert!(u.is_v7());
    assert_eq!(u.timestamp_millis(), 0x018f_1234_5678);
    assert_eq!(u.sequence(), 0x0ABC);

    let bytes = u.as_bytes();
    assert_eq!(bytes[6] >> 4, 0x7, "version nibble");
    assert_eq!(bytes[8] >> 6, 0b10, "variant bits");
}

#[test]
fn test_mint_at_is_deterministic() {
    let state = GenState::new(fixed_seed(), 0);
    let a = state.mint_at(1_700_000_000_000, 7);
    let b = state.mint_at(1_700_000_000_000, 7);
    assert_eq!(a, b);

    let c = state.mint_at(1_700_000_000_000, 8);
    assert_ne!(a, c, "sequence must perturb the random tail");

    let mut other_seed = fixed_seed();
    other_seed[40] ^= 0xFF;
    let foreign = GenState::new(other_seed, 0);
    assert_ne!(a, foreign.mint_at(1_700_000_000_000, 7));
}

#[test]
fn test_mint_never_goes_backwards() {
    let mut state = GenState::new(fixed_seed(), 0);
    let mut prev = state.mint();
    for _ in 0..500 {
        let next = state.mint();
        assert!(next > prev, "{next} must sort after {prev}");
        assert!(next.timestamp_millis() >= prev.timestamp_millis());
        prev = next;
    }
}

#[test]
fn test_same_millisecond_bumps_sequence() {
    // A notBefore far in the future pins the mint timestamp.
    let future = 4_000_000_000_000;
    let mut state = GenState::new(fixed_seed(), future);

    let first = state.mint();
    let second = state.mint();
    assert_eq!(first.timestamp_millis(), future);
    assert_eq!(second.timestamp_millis(), future);
    assert_eq!(second.sequence(), first.sequence() + 1);
}

#[test]
fn test_sequence_overflow_rolls_timestamp() {
    let future = 4_000_000_000_000;
    let mut state = GenState::new(fixed_seed(), future);
    state.last_gen_seq = 4095;

    let u = state.mint();
    assert_eq!(u.timestamp_millis(), future + 1);
    assert_eq!(u.sequence(), 0);
}

#[test]
fn test_display_parse_roundtrip() {
    let state = GenState::new(fixed_seed(), 0);
    let u = state.mint_at(1_700_000_000_000, 42);

    let text = u.to_string();
    assert_eq!(text.len(), 36);
    assert_eq!(text.as_bytes()[8], b'-');
    assert_eq!(text.as_bytes()[13], b'-');
    assert_eq!(text.as_bytes()[18], b'-');
    assert_eq!(text.as_bytes()[23], b'-');

    assert_eq!(text.replace('-', ""), hex::encode(u.as_bytes()));

    let parsed: Uuid7 = text.parse().expect("roundtrip parse");
    assert_eq!(parsed, u);

    // Uppercase input parses to the same bytes.
    let upper: Uuid7 = text.to_uppercase().parse().expect("uppercase parse");
    assert_eq!(upper, u);
}

#[test]
fn test_parse_rejects_malformed() {
    assert!("018f0000-0000-7000-8000-00000000001".parse::<Uuid7>().is_err());
    assert!(
        "018f0000-0000-7000-8000-0000000000011"
            .parse::<Uuid7>()
            .is_err()
    );
    // Dash in the wrong place.
    assert!(
        "018f000-00000-7000-8000-000000000001"
            .parse::<Uuid7>()
            .is_err()
    );
    // Non-hex digit.
    assert!(
        "018f0000-0000-7000-8000-00000000000g"
            .parse::<Uuid7>()
            .is_err()
    );
    assert!("".parse::<Uuid7>().is_err());
}

#[test]
fn test_byte_order_matches_hex_order() {
    let mut state = GenState::new(fixed_seed(), 0);
    let mut ids: Vec<Uuid7> = (0..50).map(|_| state.mint()).collect();

    let mut by_bytes = ids.clone();
    by_bytes.sort();
    ids.sort_by_key(|u| u.to_string());
    assert_eq!(ids, by_bytes);
}

#[test]
fn test_reconstruct_equals_original() {
    let mut state = GenState::new(fixed_seed(), 1_700_000_000_000);
    for _ in 0..10 {
        let u = state.mint();
        assert_eq!(state.reconstruct(&u), u);
    }
}
