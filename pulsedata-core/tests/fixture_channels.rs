#![allow(clippy::unreadable_literal, clippy::float_cmp)]
use approx::assert_abs_diff_eq;
use ndarray::{arr1, arr2, arr3, ArrayD};
use pulsedata_core::{
    BatchConfig, Channel, ChannelRef, ChannelSet, Error, MemoryArray, Selection, SourceRef,
    StatsOptions, StoreState, Valid,
};
use std::rc::Rc;

const SCALARS: &str = "run_test.SCALARS.h5";
const ARRAYS: &str = "run_test.ARRAYS.h5";

fn channel(file: &Rc<StoreState>, name: &str, pids: &[i64], data: ArrayD<f64>) -> ChannelRef {
    let group = format!("/data/{name}");
    let pids: SourceRef<i64> = Rc::new(
        MemoryArray::new(
            format!("{group}/pulse_id"),
            arr1(pids).into_dyn(),
        )
        .in_file(Rc::clone(file)),
    );
    let data: SourceRef<f64> =
        Rc::new(MemoryArray::new(format!("{group}/data"), data).in_file(Rc::clone(file)));
    Rc::new(Channel::new(name, pids, data).unwrap())
}

fn image(first: f64) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    let cycle = [0.1, 2.3, 4.5, 6.7, 8.9];
    let start = cycle.iter().position(|&v| v == first).unwrap();
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = cycle[(start + i * 3 + j) % cycle.len()];
        }
    }
    out
}

struct Fixture {
    scalars: Rc<StoreState>,
    arrays: Rc<StoreState>,
    set: ChannelSet,
}

fn fixture() -> Fixture {
    let scalars = StoreState::new(SCALARS);
    let arrays = StoreState::new(ARRAYS);
    let channels = vec![
        channel(&scalars, "ch1", &[0, 1, 2], arr1(&[0.1, 2.3, 4.5]).into_dyn()),
        channel(
            &scalars,
            "ch2",
            &[0, 1, 2],
            arr2(&[[6.7], [8.9], [0.1]]).into_dyn(),
        ),
        channel(&scalars, "ch3", &[0, 2], arr1(&[2.3, 4.5]).into_dyn()),
        channel(
            &arrays,
            "ch4",
            &[0, 1, 2],
            arr2(&[[0.1, 2.3, 4.5], [6.7, 8.9, 0.1], [2.3, 4.5, 6.7]]).into_dyn(),
        ),
        channel(
            &arrays,
            "ch5",
            &[0, 1, 2],
            arr3(&[image(0.1), image(8.9), image(6.7)]).into_dyn(),
        ),
        channel(
            &arrays,
            "ch6",
            &[0, 2],
            arr2(&[[0.1, 2.3, 4.5], [6.7, 8.9, 0.1]]).into_dyn(),
        ),
    ];
    Fixture {
        scalars,
        arrays,
        set: channels.into_iter().collect(),
    }
}

#[test]
fn test_fixture_layout() {
    let Fixture { set, .. } = fixture();
    assert_eq!(set.names(), vec!["ch1", "ch2", "ch3", "ch4", "ch5", "ch6"]);
    assert_eq!(set.to_string(), "ChannelSet: 6 channels");

    let ch5 = set.get("ch5").unwrap();
    assert_eq!(ch5.to_string(), "Channel: ch5");
    assert_eq!(ch5.shape().unwrap(), vec![3, 3, 3]);
    assert_eq!(
        ch5.get(&[1]).unwrap(),
        arr2(&[[8.9, 0.1, 2.3], [4.5, 6.7, 8.9], [0.1, 2.3, 4.5]]).into_dyn()
    );

    let ch2 = set.get("ch2").unwrap();
    let data = ch2.data().unwrap();
    assert_eq!(data.ndim(), 1);
    assert_abs_diff_eq!(data[[1]], 8.9);
}

#[test]
fn test_drop_missing_aligns_every_channel() {
    let Fixture { set, .. } = fixture();
    assert_eq!(set.pids().unwrap(), vec![0, 2]);
    assert_eq!(set.all_pids().unwrap(), vec![0, 1, 2]);

    set.drop_missing().unwrap();
    let ch5 = set.get("ch5").unwrap();
    assert_eq!(ch5.valid().as_slice(), Some(&[0, 2][..]));
    assert_eq!(ch5.shape().unwrap(), vec![2, 3, 3]);
    assert!(set.get("ch3").unwrap().valid().is_all());

    for ch in &set {
        assert_eq!(ch.pids().unwrap().to_vec(), vec![0, 2], "{}", ch.name());
        assert_eq!(ch.data().unwrap().shape()[0], 2, "{}", ch.name());
    }

    let ch1 = set.get("ch1").unwrap();
    let data = ch1.data().unwrap();
    assert_abs_diff_eq!(data[[0]], 0.1);
    assert_abs_diff_eq!(data[[1]], 4.5);

    set.reset_valid();
    for ch in &set {
        assert_eq!(ch.valid(), Valid::All);
        assert_eq!(ch.len().unwrap(), ch.ntotal().unwrap());
    }
}

#[test]
fn test_subset_shares_channels() {
    let Fixture { set, .. } = fixture();
    let subset = match set.select(vec!["ch1", "ch3"]).unwrap() {
        Selection::Set(subset) => subset,
        Selection::Channel(_) => panic!("expected a subset"),
    };
    subset.drop_missing().unwrap();

    let ch1 = set.get("ch1").unwrap();
    assert_eq!(ch1.nvalid().unwrap(), 2);
    assert_eq!(ch1.ntotal().unwrap(), 3);

    set.reset_valid();
    assert!(subset.get("ch1").unwrap().valid().is_all());
    assert!(matches!(set.select("notakey"), Err(Error::KeyNotFound(_))));
}

#[test]
fn test_batches_after_alignment() {
    let Fixture { set, .. } = fixture();
    set.drop_missing().unwrap();
    let ch4 = set.get("ch4").unwrap();

    let batches: Vec<_> = ch4
        .in_batches(&BatchConfig::new(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].index, 1..2);
    assert_eq!(batches[1].data, arr2(&[[2.3, 4.5, 6.7]]).into_dyn());

    let sums = ch4
        .apply_in_batches(|x| x.sum_axis(ndarray::Axis(1)), &BatchConfig::new(5))
        .unwrap();
    assert_eq!(sums.shape(), &[2]);
    assert_abs_diff_eq!(sums[[0]], 6.9, epsilon = 1e-12);
    assert_abs_diff_eq!(sums[[1]], 13.5, epsilon = 1e-12);
}

#[test]
fn test_closed_files_name_file_and_group() {
    let Fixture {
        scalars,
        arrays,
        set,
    } = fixture();
    set.close();
    scalars.close();
    arrays.close();

    let ch1 = set.get("ch1").unwrap();
    for err in [
        ch1.data().unwrap_err(),
        ch1.pids().unwrap_err(),
        ch1.shape().unwrap_err(),
        ch1.dtype().unwrap_err(),
    ] {
        let message = err.to_string();
        assert!(message.contains(SCALARS), "{message}");
        assert!(message.contains("/data/ch1"), "{message}");
    }

    let err = set.get("ch5").unwrap().data().unwrap_err().to_string();
    assert!(err.starts_with("file \"run_test.ARRAYS.h5\" containing group \"/data/ch5/"));
}

#[test]
fn test_stats_report() {
    let Fixture { set, .. } = fixture();
    let mut out = Vec::new();
    set.write_stats(
        &mut out,
        &StatsOptions::default()
            .with_color(false)
            .with_show_complete(true),
    )
    .unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("ch1 3 / 3 ->  0% loss ▇▇▇▇▇▇▇▇▇▇"));
    assert!(report.contains("ch6 2 / 3 -> 33% loss ▇▇▇▇▇▇"));
    assert!(report.contains("over the whole data set: 2 / 3 -> 33% loss"));
    assert!(report.contains("complete channels: 4 / 6 -> 33% incomplete"));
}
