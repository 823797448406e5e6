// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use crate::{container::BaselineKey, pol::Pol};

const SHAPE: (usize, usize) = (3, 4);

/// Four antennas, all baselines, with a deterministic smattering of flags.
fn flags() -> DataContainer<bool> {
    let mut flags = DataContainer::new();
    for i in 0..4 {
        for j in i + 1..4 {
            let f = Array2::from_shape_fn(SHAPE, |(t, f)| (i * 7 + j * 3 + t * 5 + f) % 3 == 0);
            flags.insert(BaselineKey::new(i, j, Pol::XX), f).unwrap();
        }
    }
    flags
}

fn count(ant_flags: &IndexMap<AntKey, Array2<bool>>) -> usize {
    ant_flags
        .values()
        .map(|f| f.iter().filter(|&&f| f).count())
        .sum()
}

#[test]
fn test_bad_thresholds() {
    let flags = flags();
    for threshold in [-0.1, 1.01, f64::NAN] {
        assert!(matches!(
            synthesize_ant_flags(&flags, threshold),
            Err(FlagError::BadThreshold(_))
        ));
    }
    assert!(synthesize_ant_flags(&flags, 0.0).is_ok());
    assert!(synthesize_ant_flags(&flags, 1.0).is_ok());
}

#[test]
fn test_monotonic_in_threshold() {
    let flags = flags();
    let mut previous = usize::MAX;
    for i in 0..=20 {
        let threshold = i as f64 / 20.0;
        let n = count(&synthesize_ant_flags(&flags, threshold).unwrap());
        assert!(n <= previous, "threshold {threshold} flagged {n} > {previous}");
        previous = n;
    }
}

#[test]
fn test_fractions() {
    let mut flags = DataContainer::new();
    let unflagged = Array2::from_elem(SHAPE, false);
    let mut one_pixel = unflagged.clone();
    one_pixel[(1, 2)] = true;
    flags.insert(BaselineKey::new(0, 1, Pol::XX), one_pixel).unwrap();
    flags.insert(BaselineKey::new(0, 2, Pol::XX), unflagged.clone()).unwrap();
    flags.insert(BaselineKey::new(1, 2, Pol::XX), unflagged).unwrap();

    // Antennas 0 and 1 have half of their baselines flagged at (1, 2).
    let ant_flags = synthesize_ant_flags(&flags, 0.4).unwrap();
    assert_eq!(ant_flags.len(), 3);
    assert!(ant_flags[&(0, AntPol::X)][(1, 2)]);
    assert!(ant_flags[&(1, AntPol::X)][(1, 2)]);
    assert!(!ant_flags[&(2, AntPol::X)].iter().any(|&f| f));
    assert_eq!(count(&ant_flags), 2);

    let ant_flags = synthesize_ant_flags(&flags, 0.5).unwrap();
    assert_eq!(count(&ant_flags), 0);

    // A threshold of 1 needs every baseline flagged.
    let ant_flags = synthesize_ant_flags(&flags, 1.0).unwrap();
    assert_eq!(count(&ant_flags), 0);
}

#[test]
fn test_partially_flagged_neighbours() {
    let mut flags = DataContainer::new();
    let unflagged = Array2::from_elem(SHAPE, false);
    let flagged = Array2::from_elem(SHAPE, true);
    flags.insert(BaselineKey::new(0, 1, Pol::YY), unflagged.clone()).unwrap();
    flags.insert(BaselineKey::new(0, 2, Pol::YY), flagged.clone()).unwrap();
    flags.insert(BaselineKey::new(1, 2, Pol::YY), flagged).unwrap();
    // Antenna 2 isn't dead because its baseline with 3 is unflagged.
    flags.insert(BaselineKey::new(2, 3, Pol::YY), unflagged).unwrap();

    let ant_flags = synthesize_ant_flags(&flags, 0.0).unwrap();
    assert_eq!(
        ant_flags.keys().copied().collect::<Vec<_>>(),
        vec![(0, AntPol::Y), (1, AntPol::Y), (2, AntPol::Y), (3, AntPol::Y)]
    );
    assert!(ant_flags[&(0, AntPol::Y)].iter().all(|&f| f));
    assert!(!ant_flags[&(3, AntPol::Y)].iter().any(|&f| f));

    // Antennas 0 and 1 have half their baselines flagged, antenna 2 two thirds.
    let ant_flags = synthesize_ant_flags(&flags, 0.5).unwrap();
    assert!(!ant_flags[&(0, AntPol::Y)].iter().any(|&f| f));
    assert!(!ant_flags[&(1, AntPol::Y)].iter().any(|&f| f));
    assert!(ant_flags[&(2, AntPol::Y)].iter().all(|&f| f));
    let ant_flags = synthesize_ant_flags(&flags, 0.7).unwrap();
    assert_eq!(count(&ant_flags), 0);
}

#[test]
fn test_fully_flagged_antenna() {
    let mut flags = DataContainer::new();
    let unflagged = Array2::from_elem(SHAPE, false);
    let dead = Array2::from_elem(SHAPE, true);
    flags.insert(BaselineKey::new(0, 1, Pol::XX), unflagged).unwrap();
    flags.insert(BaselineKey::new(0, 2, Pol::XX), dead.clone()).unwrap();
    flags.insert(BaselineKey::new(1, 2, Pol::XX), dead).unwrap();

    let ant_flags = synthesize_ant_flags(&flags, 0.5).unwrap();
    assert!(ant_flags[&(2, AntPol::X)].iter().all(|&f| f));
    // The dead antenna's baselines are excluded, so 0 and 1 are clean.
    assert!(!ant_flags[&(0, AntPol::X)].iter().any(|&f| f));
    assert!(!ant_flags[&(1, AntPol::X)].iter().any(|&f| f));
}

#[test]
fn test_cross_pols_and_pseudo_stokes() {
    let mut flags = DataContainer::new();
    flags
        .insert(BaselineKey::new(0, 1, Pol::XY), Array2::from_elem(SHAPE, false))
        .unwrap();
    let ant_flags = synthesize_ant_flags(&flags, 0.0).unwrap();
    assert_eq!(
        ant_flags.keys().copied().collect::<Vec<_>>(),
        vec![(0, AntPol::X), (1, AntPol::Y)]
    );

    flags
        .insert(BaselineKey::new(0, 2, Pol::I), Array2::from_elem(SHAPE, false))
        .unwrap();
    assert!(matches!(
        synthesize_ant_flags(&flags, 0.0),
        Err(FlagError::Pol(_))
    ));
}

#[test]
fn test_empty() {
    let flags = DataContainer::new();
    assert!(synthesize_ant_flags(&flags, 0.5).unwrap().is_empty());
}
