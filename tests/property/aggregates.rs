//! Property-based tests for directory size aggregates

use proptest::prelude::*;
use std::collections::HashMap;
use treefs::Filesystem;

#[derive(Debug, Clone)]
enum Step {
    Write { file: u8, len: usize },
    Unlink { file: u8 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0u8..6, 0usize..64).prop_map(|(file, len)| Step::Write { file, len }),
        1 => (0u8..6).prop_map(|file| Step::Unlink { file }),
    ]
}

fn path(file: u8) -> String {
    format!("/app/folders/shared/{}/f{}.bin", if file % 2 == 0 { "even" } else { "odd" }, file)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Aggregate sizes always equal the sum of live file sizes below them
    #[test]
    fn test_aggregate_sizes_match_live_files(steps in prop::collection::vec(step(), 1..20)) {
        let fs = Filesystem::in_memory().unwrap();
        fs.initialize_application("app").unwrap();
        fs.mkdir("/app/folders/shared/even").unwrap();
        fs.mkdir("/app/folders/shared/odd").unwrap();

        let mut live: HashMap<u8, usize> = HashMap::new();
        for step in steps {
            match step {
                Step::Write { file, len } => {
                    fs.write_file(&path(file), &vec![file; len]).unwrap();
                    live.insert(file, len);
                }
                Step::Unlink { file } => {
                    let removed = fs.unlink(&path(file));
                    prop_assert_eq!(removed.is_ok(), live.remove(&file).is_some());
                }
            }
        }

        let expected = |parity: u8| -> u64 {
            live.iter().filter(|(f, _)| *f % 2 == parity).map(|(_, len)| *len as u64).sum()
        };
        prop_assert_eq!(fs.file_size("/app/folders/shared/even").unwrap(), expected(0));
        prop_assert_eq!(fs.file_size("/app/folders/shared/odd").unwrap(), expected(1));
        prop_assert_eq!(
            fs.file_size("/app/folders/shared").unwrap(),
            expected(0) + expected(1)
        );
        prop_assert_eq!(fs.recalculate_folder_sizes().unwrap().corrected, 0);
    }
}
