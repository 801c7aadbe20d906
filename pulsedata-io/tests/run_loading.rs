use ndarray::{arr1, arr2};
use pulsedata_core::Records;
use pulsedata_io::{DataFile, DataFiles, Error, MemoryFile, MemoryGroup, OpenOptions};
use std::path::Path;

fn open_fixture(path: &Path, options: &OpenOptions) -> Result<DataFile, Error> {
    let name = path.display().to_string();
    let file = if name.ends_with("SCALARS.h5") {
        MemoryFile::new(name.clone())
            .with_group(
                "ch1",
                MemoryGroup::channel(&[0, 1, 2], arr1(&[0.1, 2.3, 4.5]).into_dyn())
                    .with_meta("meta", vec![("gain".to_string(), arr1(&[1.5]).into_dyn())]),
            )
            .with_group(
                "ch2",
                MemoryGroup::channel(&[0, 1, 2], arr2(&[[6.7], [8.9], [0.1]]).into_dyn()),
            )
            .with_group("ch3", MemoryGroup::channel(&[0, 2], arr1(&[2.3, 4.5]).into_dyn()))
    } else if name.ends_with("ARRAYS.h5") {
        MemoryFile::new(name.clone())
            .with_group(
                "ch4",
                MemoryGroup::channel(
                    &[0, 1, 2],
                    arr2(&[[0.1, 2.3, 4.5], [6.7, 8.9, 0.1], [2.3, 4.5, 6.7]]).into_dyn(),
                ),
            )
            .with_group(
                "ch6",
                MemoryGroup::channel(&[0, 2], arr2(&[[0.1, 2.3, 4.5], [6.7, 8.9, 0.1]]).into_dyn()),
            )
    } else {
        return Err(Error::InvalidFormat(format!("unknown fixture {name}")));
    };
    DataFile::from_source(path, Box::new(file), options)
}

fn run() -> DataFiles {
    DataFiles::load_with(
        [
            "run_test.SCALARS.h5",
            "run_test.PVCHANNELS.h5",
            "run_test.ARRAYS.h5",
        ],
        &OpenOptions::default(),
        open_fixture,
    )
    .unwrap()
}

#[test]
fn test_run_merges_files() {
    let run = run();
    assert_eq!(
        run.to_string(),
        "DataFiles(\"run_test.ARRAYS.h5\", \"run_test.SCALARS.h5\"): 5 channels"
    );
    assert_eq!(run.names(), vec!["ch4", "ch6", "ch1", "ch2", "ch3"]);
    assert_eq!(run.pids().unwrap(), vec![0, 2]);
    assert_eq!(run.all_pids().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_alignment_across_files() {
    let run = run();
    run.drop_missing().unwrap();
    let ch2 = run.get("ch2").unwrap();
    assert_eq!(ch2.data().unwrap(), arr1(&[6.7, 0.1]).into_dyn());

    // The file-level set sees the alignment done on the run.
    let scalars = &run.files()[1];
    assert_eq!(scalars.get("ch1").unwrap().nvalid().unwrap(), 2);

    run.reset_valid();
    assert!(scalars.get("ch1").unwrap().valid().is_all());
}

#[test]
fn test_closing_the_run_guards_every_channel() {
    let run = run();
    let ch1 = run.get("ch1").unwrap();
    let ch4 = run.get("ch4").unwrap();
    let meta_gain = ch1.meta().unwrap().get("gain").unwrap();
    assert_eq!(meta_gain, Records::Float(arr1(&[1.5]).into_dyn()));

    run.close().unwrap();
    let message = ch4.pids().unwrap_err().to_string();
    assert!(message.contains("file \"run_test.ARRAYS.h5\""), "{message}");
    assert!(message.contains("group \"/data/ch4/pulse_id\""), "{message}");
    assert!(ch1.meta().unwrap().get("gain").is_err());
}

#[test]
fn test_unusable_runs() {
    let err = DataFiles::load_with(["run_test.OTHER.h5"], &OpenOptions::default(), open_fixture)
        .unwrap_err();
    assert!(matches!(err, Error::NoUsableFile(_)));
    assert_eq!(err.to_string(), "no usable file among: \"run_test.OTHER.h5\"");
}
