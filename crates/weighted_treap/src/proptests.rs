use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

type Oracle = BTreeMap<u8, Vec<(u32, i64)>>;

fn flatten(m: &Oracle) -> Vec<(u8, u32, i64)> {
    m.iter()
        .flat_map(|(&k, l)| l.iter().map(move |&(v, w)| (k, v, w)))
        .collect()
}

fn sum_where(m: &Oracle, keep: impl Fn(u8) -> bool) -> i64 {
    m.iter()
        .filter(|&(&k, _)| keep(k))
        .flat_map(|(_, l)| l.iter().map(|&(_, w)| w))
        .sum()
}

/// Value of the `slot`-th entry at `key`, or one that is never stored.
fn pick(m: &Oracle, key: u8, slot: usize) -> u32 {
    match m.get(&key) {
        Some(l) => l[slot % l.len()].0,
        None => u32::MAX,
    }
}

fn take(m: &mut Oracle, key: u8, value: u32) -> Option<i64> {
    let l = m.get_mut(&key)?;
    let i = l.iter().position(|&(v, _)| v == value)?;
    let (_, w) = l.remove(i);
    if l.is_empty() {
        m.remove(&key);
    }
    Some(w)
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u8, i64),
    Remove(u8, usize),
    RemoveAll(u8),
    Move(u8, usize, u8),
    SetWeight(u8, usize, i64),
    SplitMerge(u8),
    Sums(u8, u8),
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = 0u8..48;
    let weight = -1000i64..=1000;
    let op = prop_oneof![
        40 => (key.clone(), weight.clone()).prop_map(|(k, w)| Op::Insert(k, w)),
        10 => (key.clone(), any::<usize>()).prop_map(|(k, s)| Op::Remove(k, s)),
        5 => key.clone().prop_map(Op::RemoveAll),
        10 => (key.clone(), any::<usize>(), key.clone()).prop_map(|(k, s, n)| Op::Move(k, s, n)),
        10 => (key.clone(), any::<usize>(), weight).prop_map(|(k, s, w)| Op::SetWeight(k, s, w)),
        5 => key.clone().prop_map(Op::SplitMerge),
        20 => (key.clone(), key).prop_map(|(a, b)| Op::Sums(a, b)),
    ];
    prop::collection::vec(op, 0..=400)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_btreemap(ops in ops_strategy(), seed in any::<u64>()) {
        let mut t: TreapMap<u8, u32, i64> = TreapMap::with_seed(seed);
        let mut m = Oracle::new();
        let mut next_value = 0u32;

        for op in ops {
            match op {
                Op::Insert(k, w) => {
                    t.insert(k, next_value, w);
                    m.entry(k).or_default().push((next_value, w));
                    next_value += 1;
                }
                Op::Remove(k, slot) => {
                    let v = pick(&m, k, slot);
                    prop_assert_eq!(t.remove(&k, &v), take(&mut m, k, v).is_some());
                }
                Op::RemoveAll(k) => {
                    prop_assert_eq!(t.remove_all(&k), m.remove(&k).is_some());
                }
                Op::Move(k, slot, new_k) => {
                    let v = pick(&m, k, slot);
                    let moved = take(&mut m, k, v);
                    prop_assert_eq!(t.move_entry(&k, &v, new_k), moved.is_some());
                    if let Some(w) = moved {
                        m.entry(new_k).or_default().push((v, w));
                    }
                }
                Op::SetWeight(k, slot, w) => {
                    let v = pick(&m, k, slot);
                    let found = m
                        .get_mut(&k)
                        .and_then(|l| l.iter_mut().find(|e| e.0 == v))
                        .map(|e| e.1 = w)
                        .is_some();
                    prop_assert_eq!(t.set_weight(&k, &v, w), found);
                }
                Op::SplitMerge(k) => {
                    let total = t.total_weight();
                    let mut right = t.split(&k);
                    t.assert_invariants();
                    right.assert_invariants();
                    prop_assert!(t.iter().all(|(key, _, _)| *key < k));
                    prop_assert!(right.iter().all(|(key, _, _)| *key >= k));
                    prop_assert_eq!(t.total_weight() + right.total_weight(), total);
                    prop_assert_eq!(right.total_weight(), sum_where(&m, |key| key >= k));

                    if !t.is_empty() && !right.is_empty() {
                        prop_assert!(!right.merge(&mut t));
                    }
                    prop_assert!(t.merge(&mut right));
                    prop_assert!(right.is_empty());
                }
                Op::Sums(a, b) => {
                    prop_assert_eq!(t.weight_before(&a), sum_where(&m, |k| k < a));
                    prop_assert_eq!(t.weight_to(&a), sum_where(&m, |k| k <= a));
                    prop_assert_eq!(t.weight_from(&a), sum_where(&m, |k| k >= a));
                    prop_assert_eq!(t.weight_after(&a), sum_where(&m, |k| k > a));
                    if a <= b {
                        prop_assert_eq!(
                            t.weight_between(&a, &b),
                            sum_where(&m, |k| a <= k && k <= b)
                        );
                    }
                }
            }

            t.assert_invariants();
            prop_assert_eq!(t.len(), m.values().map(Vec::len).sum::<usize>());
        }

        let got: Vec<(u8, u32, i64)> = t.iter().map(|(k, v, w)| (*k, *v, *w)).collect();
        prop_assert_eq!(got, flatten(&m));
        let back: Vec<(u8, u32, i64)> = t.iter().rev().map(|(k, v, w)| (*k, *v, *w)).collect();
        let mut expected = flatten(&m);
        expected.reverse();
        prop_assert_eq!(back, expected);
    }

    #[test]
    fn prop_identity_fragments_sum_like_one_tree(
        entries in prop::collection::vec((0u8..64, -100i64..=100), 0..200),
        cuts in prop::collection::vec(1u8..64, 0..8),
        probes in prop::collection::vec(0u8..64, 1..16),
    ) {
        let mut f: FragmentedTreapMap<u8, u32, i64, i64> = FragmentedTreapMap::new();
        let mut t: TreapMap<u8, u32, i64> = TreapMap::new();
        for (i, &(k, w)) in entries.iter().enumerate() {
            f.insert(k, i as u32, w);
            t.insert(k, i as u32, w);
        }
        for &cut in &cuts {
            f.split_fragment_at(cut, 1);
        }
        f.assert_invariants();

        prop_assert_eq!(f.len(), t.len());
        prop_assert_eq!(f.total_weight(), t.total_weight());
        for p in probes {
            prop_assert_eq!(f.weight_before(&p), t.weight_before(&p));
            prop_assert_eq!(f.weight_to(&p), t.weight_to(&p));
            prop_assert_eq!(f.weight_from(&p), t.weight_from(&p));
            prop_assert_eq!(f.weight_after(&p), t.weight_after(&p));
            prop_assert_eq!(f.weight_between(&0, &p), t.weight_between(&0, &p));
        }
        let a: Vec<_> = f.iter().collect();
        let b: Vec<_> = t.iter().collect();
        prop_assert_eq!(a, b);

        for &cut in &cuts {
            f.join_fragments_at(&cut);
        }
        prop_assert_eq!(f.fragment_count(), 1);
        f.assert_invariants();
    }
}
