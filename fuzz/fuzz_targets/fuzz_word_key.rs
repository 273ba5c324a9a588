#![no_main]

use libfuzzer_sys::fuzz_target;
use wordstore::{SqliteStorage, TableStore, Word};

fuzz_target!(|data: &[u8]| {
    let Ok(key) = std::str::from_utf8(data) else {
        return;
    };

    match Word::new(key) {
        Ok(word) => {
            assert!(!key.trim().is_empty() && !key.contains('\0'));
            assert_eq!(word.as_str(), key);

            let json = serde_json::to_string(&word).unwrap();
            let back: Word = serde_json::from_str(&json).unwrap();
            assert_eq!(back, word);

            let store = SqliteStorage::open_memory().unwrap();
            store.insert(&word).unwrap();
            store.insert(&word).unwrap();
            assert_eq!(store.select_all().unwrap(), vec![word]);
        }
        Err(err) => {
            assert!(key.trim().is_empty() || key.contains('\0'));
            assert!(err.is_validation());
        }
    }
});
