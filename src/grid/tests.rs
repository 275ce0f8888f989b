// src/grid/tests.rs

use super::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;

/// A value no reset can produce.
const MAX_STATE_MARKER: CellState = crate::rules::MAX_AGE;

fn blank(rows: usize, cols: usize) -> Grid {
    Grid::new(rows, cols).unwrap()
}

fn locked(grid: &Grid, row: usize, col: usize, wrap: bool) -> Vec<(usize, usize)> {
    grid.try_lock_neighborhood(row, col, wrap)
        .expect("neighborhood should be free")
        .locked_cells()
        .collect()
}

#[test_log::test]
fn it_should_reject_grids_smaller_than_five_by_five() {
    assert!(Grid::new(4, 10).is_err());
    assert!(Grid::new(10, 4).is_err());
    assert!(Grid::new(5, 5).is_ok());
}

#[test_log::test]
fn it_should_read_and_write_cells_inside_the_grid() {
    let grid = blank(6, 7);
    assert_eq!(grid.rows(), 6);
    assert_eq!(grid.cols(), 7);
    assert_eq!(grid.len(), 42);

    grid.set(5, 6, ALIVE).unwrap();
    assert_eq!(grid.get(5, 6), Some(ALIVE));
    assert_eq!(grid.get(0, 0), Some(DEAD));
    assert_eq!(grid.live_cells(), 1);

    grid.set(5, 6, 3).unwrap();
    assert_eq!(grid.live_cells(), 1, "aging a live cell is not a birth");
    grid.set(5, 6, DEAD).unwrap();
    assert_eq!(grid.live_cells(), 0);
}

#[test_log::test]
fn it_should_report_out_of_range_access_without_panicking() {
    let grid = blank(5, 5);
    assert_eq!(grid.get(5, 0), None);
    assert_eq!(grid.get(0, 5), None);
    assert!(grid.set(7, 7, ALIVE).is_err());
    assert!(grid.try_lock_neighborhood(5, 5, false).is_none());
}

#[test_log::test]
fn reset_produces_only_dead_or_alive_cells_with_even_odds() {
    let grid = blank(100, 100);
    let mut rng = StdRng::seed_from_u64(7);
    let mut total_alive = 0;
    for _ in 0..10 {
        grid.reset(&mut rng);
        let snapshot = grid.snapshot();
        assert!(snapshot.cells().iter().all(|&s| s == DEAD || s == ALIVE));
        assert_eq!(snapshot.live_cells(), grid.live_cells());
        total_alive += snapshot.live_cells();
    }
    let fraction = total_alive as f64 / (10.0 * grid.len() as f64);
    assert!((0.48..0.52).contains(&fraction), "alive fraction {}", fraction);
}

#[test_log::test]
fn from_states_checks_length_and_counts_live_cells() {
    let mut states = vec![DEAD; 25];
    states[12] = ALIVE;
    states[13] = 4;
    let grid = Grid::from_states(5, 5, &states).unwrap();
    assert_eq!(grid.live_cells(), 2);
    assert_eq!(grid.get(2, 3), Some(4));
    assert!(Grid::from_states(5, 5, &states[..24]).is_err());
}

#[test_log::test]
fn snapshot_rows_follow_row_major_layout() {
    let grid = blank(5, 6);
    grid.set(1, 4, ALIVE).unwrap();
    let snapshot = grid.consistent_snapshot();
    let rows: Vec<&[CellState]> = snapshot.iter_rows().collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1][4], ALIVE);
    assert_eq!(snapshot.get(1, 4), Some(ALIVE));
    assert_eq!(snapshot.get(5, 0), None);
}

#[test_log::test]
fn interior_neighborhood_locks_nine_cells_in_row_major_order() {
    let grid = blank(6, 6);
    let cells = locked(&grid, 2, 3, false);
    let expected: Vec<(usize, usize)> = (1..=3)
        .flat_map(|r| (2..=4).map(move |c| (r, c)))
        .collect();
    assert_eq!(cells, expected);
}

#[test_log::test]
fn edge_neighborhoods_skip_off_grid_cells() {
    let grid = blank(5, 5);
    assert_eq!(locked(&grid, 0, 0, false), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    assert_eq!(locked(&grid, 4, 2, false).len(), 6);
    assert_eq!(locked(&grid, 4, 4, false), vec![(3, 3), (3, 4), (4, 3), (4, 4)]);
}

#[test_log::test]
fn wrapped_neighborhood_locks_cells_across_the_edges_in_global_order() {
    let grid = blank(5, 5);
    let cells = locked(&grid, 0, 0, true);
    assert_eq!(
        cells,
        vec![
            (0, 0),
            (0, 1),
            (0, 4),
            (1, 0),
            (1, 1),
            (1, 4),
            (4, 0),
            (4, 1),
            (4, 4)
        ]
    );
}

#[test_log::test]
fn wrapped_view_reads_the_opposite_edges() {
    let grid = blank(5, 5);
    grid.set(4, 4, ALIVE).unwrap();
    grid.set(0, 4, ALIVE).unwrap();
    let guard = grid.lock_neighborhood(0, 0, true).unwrap();
    let view = guard.view();
    assert!(!view.touches_border());
    assert_eq!(view.neighbors().flatten().filter(|&s| s != DEAD).count(), 2);
    drop(guard);

    let guard = grid.lock_neighborhood(0, 0, false).unwrap();
    let view = guard.view();
    assert!(view.touches_border());
    assert_eq!(view.neighbors().flatten().filter(|&s| s != DEAD).count(), 0);
}

#[test_log::test]
fn failed_acquisition_releases_every_lock_it_took() {
    let grid = blank(7, 7);
    // Holds rows 3..=5, cols 3..=5.
    let blocker = grid.lock_neighborhood(4, 4, false).unwrap();

    // (2, 2) needs rows 1..=3, cols 1..=3. It takes eight locks before
    // hitting (3, 3), which the blocker owns.
    assert!(grid.try_lock_neighborhood(2, 2, false).is_none());

    // (0, 0) covers rows 0..=1 and cols 0..=1, overlapping only the part the
    // failed attempt had grabbed. It must be free again.
    let corner = grid.try_lock_neighborhood(0, 0, false);
    assert!(corner.is_some(), "partial locks leaked from the failed attempt");
    drop(corner);

    drop(blocker);
    assert!(grid.try_lock_neighborhood(2, 2, false).is_some());
}

#[test_log::test]
fn guard_releases_its_locks_when_dropped() {
    let grid = blank(5, 5);
    {
        let _guard = grid.lock_neighborhood(2, 2, false).unwrap();
        assert!(grid.try_lock_neighborhood(3, 3, false).is_none());
    }
    assert!(grid.try_lock_neighborhood(3, 3, false).is_some());
}

#[test_log::test]
fn set_center_updates_the_live_counter_and_returns_the_old_state() {
    let grid = blank(5, 5);
    let mut guard = grid.lock_neighborhood(2, 2, false).unwrap();
    assert_eq!(guard.set_center(ALIVE), DEAD);
    assert_eq!(guard.set_center(3), ALIVE);
    assert_eq!(guard.center(), 3);
    drop(guard);
    assert_eq!(grid.get(2, 2), Some(3));
    assert_eq!(grid.live_cells(), 1);
}

#[test_log::test]
fn overlapping_updates_never_observe_each_other_mid_flight() {
    const THREADS: usize = 4;
    const UPDATES_PER_THREAD: usize = 2_000;

    let grid = Arc::new(blank(5, 5));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let grid = Arc::clone(&grid);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                let mut writes = vec![0u32; grid.len()];
                for _ in 0..UPDATES_PER_THREAD {
                    let row = rng.random_range(0..grid.rows());
                    let col = rng.random_range(0..grid.cols());
                    let mut guard = grid.lock_neighborhood(row, col, false).unwrap();
                    let before = guard.view();
                    thread::yield_now();
                    // Nobody else may have written any cell in the block.
                    assert_eq!(before, guard.view());
                    let center = guard.center();
                    guard.set_center(center.wrapping_add(1));
                    writes[row * grid.cols() + col] += 1;
                }
                writes
            })
        })
        .collect();

    let mut expected = vec![0u32; grid.len()];
    for handle in handles {
        for (total, writes) in expected.iter_mut().zip(handle.join().unwrap()) {
            *total += writes;
        }
    }

    // Read-modify-write of every center was exclusive: no increment was lost.
    let snapshot = grid.consistent_snapshot();
    for (state, total) in snapshot.cells().iter().zip(expected) {
        assert_eq!(u32::from(*state), total % 256);
    }
}

#[test_log::test]
fn reset_waits_for_in_flight_updates() {
    let grid = Arc::new(blank(5, 5));
    let mut guard = grid.lock_neighborhood(2, 2, false).unwrap();

    let resetter = {
        let grid = Arc::clone(&grid);
        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(1);
            grid.reset(&mut rng);
        })
    };

    thread::sleep(std::time::Duration::from_millis(50));
    assert!(!resetter.is_finished(), "reset ran while an update held its locks");
    guard.set_center(MAX_STATE_MARKER);
    drop(guard);
    resetter.join().unwrap();

    let snapshot = grid.snapshot();
    assert!(snapshot.cells().iter().all(|&s| s == DEAD || s == ALIVE));
    assert_eq!(snapshot.live_cells(), grid.live_cells());
}
