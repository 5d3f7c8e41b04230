use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Model = BTreeMap<Vec<u8>, Vec<RowId>>;

fn validate(art: &Art) {
    let issues = art.verify_integrity();
    assert!(issues.is_empty(), "integrity issues: {issues:?}\n{}", art.dump());
}

fn model_insert(m: &mut Model, key: Vec<u8>, row: RowId) -> bool {
    let rows = m.entry(key).or_default();
    if rows.contains(&row) {
        return false;
    }
    rows.push(row);
    true
}

fn model_erase(m: &mut Model, key: &[u8], row: RowId) -> bool {
    let Some(rows) = m.get_mut(key) else {
        return false;
    };
    let Some(pos) = rows.iter().position(|&r| r == row) else {
        return false;
    };
    rows.remove(pos);
    if rows.is_empty() {
        m.remove(key);
    }
    true
}

fn flatten<'a>(entries: impl Iterator<Item = (&'a Vec<u8>, &'a Vec<RowId>)>) -> Vec<(Vec<u8>, RowId)> {
    entries
        .flat_map(|(key, rows)| rows.iter().map(move |&row| (key.clone(), row)))
        .collect()
}

fn scan(cursor: Cursor<'_>) -> Vec<(Vec<u8>, RowId)> {
    cursor
        .map(|item| item.map(|(key, row)| (key.as_bytes().to_vec(), row)))
        .collect::<Result<_>>()
        .unwrap()
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Vec<u8>, RowId),
    Erase(Vec<u8>, RowId),
    Lookup(Vec<u8>),
    Range(Vec<u8>, Vec<u8>),
    Checkpoint { reopen: bool },
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A narrow alphabet forces shared prefixes, prefix splits and keys that
    // end inside other keys. The wide arm exercises Node48 and Node256.
    prop_oneof![
        3 => prop::collection::vec(0u8..4, 0..=6),
        1 => prop::collection::vec(any::<u8>(), 0..=3),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let row = 0..(4 as RowId);
    let op = prop_oneof![
        45 => (key.clone(), row.clone()).prop_map(|(k, r)| Op::Insert(k, r)),
        30 => (key.clone(), row).prop_map(|(k, r)| Op::Erase(k, r)),
        15 => key.clone().prop_map(Op::Lookup),
        8 => (key.clone(), key).prop_map(|(a, b)| Op::Range(a, b)),
        2 => any::<bool>().prop_map(|reopen| Op::Checkpoint { reopen }),
    ];
    prop::collection::vec(op, 0..=600)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_with_model(ops in ops_strategy()) {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new(256).unwrap());
        let mut art = Art::with_store(store.clone(), ArtConfig::default());
        let mut m = Model::new();

        for op in ops {
            match op {
                Op::Insert(key, row) => {
                    let got = art.insert(&Key::from(key.as_slice()), row).unwrap();
                    prop_assert_eq!(got, model_insert(&mut m, key, row));
                }
                Op::Erase(key, row) => {
                    let got = art.erase(&Key::from(key.as_slice()), row).unwrap();
                    prop_assert_eq!(got, model_erase(&mut m, &key, row));
                }
                Op::Lookup(key) => {
                    let got = art.lookup(&Key::from(key.as_slice())).unwrap().map(<[RowId]>::to_vec);
                    prop_assert_eq!(got, m.get(&key).cloned());
                }
                Op::Range(a, b) => {
                    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                    let got = scan(art.range(Key::from(lo.as_slice())..Key::from(hi.as_slice())));
                    let want = flatten(m.range::<Vec<u8>, _>((Bound::Included(&lo), Bound::Excluded(&hi))));
                    prop_assert_eq!(got, want);
                }
                Op::Checkpoint { reopen } => {
                    let root = art.checkpoint().unwrap();
                    if let (true, Some(root)) = (reopen, root) {
                        art = Art::open(store.clone(), root, ArtConfig::default()).unwrap();
                    }
                }
            }
            prop_assert_eq!(art.is_empty(), m.is_empty());
        }

        validate(&art);
        prop_assert_eq!(scan(art.iter()), flatten(m.iter()));
    }

    #[test]
    fn prop_prefix_scan_matches_filter(
        keys in prop::collection::vec(key_strategy(), 0..200),
        prefix in prop::collection::vec(0u8..4, 0..=3),
    ) {
        let mut art = Art::new();
        let mut m = Model::new();
        for (i, key) in keys.into_iter().enumerate() {
            art.insert(&Key::from(key.as_slice()), i as RowId).unwrap();
            model_insert(&mut m, key, i as RowId);
        }
        let got = scan(art.prefix_scan(&prefix));
        let want = flatten(m.iter().filter(|(key, _)| key.starts_with(&prefix)));
        prop_assert_eq!(got, want);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_set() -> Vec<Vec<u8>> {
    vec![
        b"".to_vec(),
        b"a".to_vec(),
        b"b".to_vec(),
        b"aa".to_vec(),
        b"ab".to_vec(),
        b"aab".to_vec(),
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_set();
    for_each_permutation(&keys, |perm| {
        let mut art = Art::new();
        let mut m = Model::new();
        for (i, key) in perm.into_iter().enumerate() {
            assert!(art.insert(&Key::from(key.as_slice()), i as RowId).unwrap());
            model_insert(&mut m, key, i as RowId);
        }
        validate(&art);
        assert_eq!(scan(art.iter()), flatten(m.iter()));
    });
}

#[test]
fn exhaustive_erase_order_small_set() {
    let keys = small_set();
    for_each_permutation(&keys, |perm| {
        let mut art = Art::new();
        for (i, key) in keys.iter().enumerate() {
            art.insert(&Key::from(key.as_slice()), i as RowId).unwrap();
        }
        for key in perm {
            let row = keys.iter().position(|k| *k == key).unwrap() as RowId;
            let key = Key::from(key);
            assert!(art.erase(&key, row).unwrap());
            assert_eq!(art.lookup(&key).unwrap(), None);
            validate(&art);
        }
        assert!(art.is_empty());
    });
}

#[test]
fn exhaustive_erase_order_after_checkpoint() {
    let keys = small_set();
    let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new(128).unwrap());
    let mut base = Art::with_store(store.clone(), ArtConfig::default());
    for (i, key) in keys.iter().enumerate() {
        base.insert(&Key::from(key.as_slice()), i as RowId).unwrap();
    }
    let root = base.checkpoint().unwrap().unwrap();

    for_each_permutation(&keys, |perm| {
        let mut art = Art::open(store.clone(), root, ArtConfig::default()).unwrap();
        let mut remaining = keys.len();
        for key in perm {
            let row = keys.iter().position(|k| *k == key).unwrap() as RowId;
            assert!(art.erase(&Key::from(key), row).unwrap());
            remaining -= 1;
            validate(&art);
            assert_eq!(scan(art.iter()).len(), remaining);
        }
        assert!(art.is_empty());
    });
}
