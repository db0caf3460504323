//! End-to-end slicing over a log of executed cells.

use nbslice_core::{Cell, RangeSet, SourceRange};
use nbslice_python::{DataflowAnalyzer, ExecutionLogSlicer};

/// Log each source as its own cell, executed once, in order.
fn make_log(sources: &[&str]) -> ExecutionLogSlicer {
    let mut slicer = ExecutionLogSlicer::new(DataflowAnalyzer::new());
    for (i, source) in sources.iter().enumerate() {
        let n = i as u32 + 1;
        slicer.log_execution(Cell::new(
            *source,
            Some(n),
            format!("event-{n}"),
            format!("cell-{n}"),
        ));
    }
    slicer
}

/// Log `(persistent id, source)` pairs, so a cell can be re-executed.
fn make_log_with_ids(entries: &[(&str, &str)]) -> ExecutionLogSlicer {
    let mut slicer = ExecutionLogSlicer::new(DataflowAnalyzer::new());
    for (i, (persistent_id, source)) in entries.iter().enumerate() {
        let n = i as u32 + 1;
        slicer.log_execution(Cell::new(
            *source,
            Some(n),
            format!("event-{n}"),
            *persistent_id,
        ));
    }
    slicer
}

fn event_id(slicer: &ExecutionLogSlicer, index: usize) -> String {
    slicer.cell_executions()[index]
        .cell
        .execution_event_id
        .clone()
}

fn dependent_texts(slicer: &ExecutionLogSlicer, index: usize) -> Vec<String> {
    slicer
        .get_dependent_cells(&event_id(slicer, index))
        .unwrap()
        .into_iter()
        .map(|cell| cell.text)
        .collect()
}

#[test]
fn slices_every_cell_the_result_depends_on() {
    let sources = ["x=5", "y=6", "print(x+y)"];
    let slicer = make_log(&sources);
    let last = &slicer.cell_executions().last().unwrap().cell;
    let slices = slicer.slice_all_executions(&last.persistent_id).unwrap();
    assert_eq!(slices.len(), 1);
    let slice = &slices[0];
    assert_eq!(slice.cell_slices.len(), 3);
    for (i, cell_slice) in slice.cell_slices.iter().enumerate() {
        assert_eq!(cell_slice.text_slice_lines(), sources[i]);
        assert_eq!(cell_slice.text_slice(), sources[i]);
    }
}

#[test]
fn leaves_unrelated_cells_out_of_the_slice() {
    let sources = [
        "import pandas as pd",
        "Cars = {'Brand': ['Honda Civic', 'Toyota Corolla'], 'Price': [22000, 25000]}\n\
         df = pd.DataFrame(Cars, columns=['Brand', 'Price'])",
        "def check(df, size=11):\n    print(df)",
        "print(df)",
        "x = df['Brand'].values",
    ];
    let slicer = make_log(&sources);
    let last = &slicer.cell_executions().last().unwrap().cell;
    let slice = slicer.slice_latest_execution(&last.persistent_id).unwrap();

    let texts: Vec<String> = slice
        .cell_slices
        .iter()
        .map(|cell_slice| cell_slice.text_slice())
        .collect();
    assert_eq!(texts, vec![sources[0], sources[1], sources[4]]);

    let counts: Vec<_> = slice
        .cell_slices
        .iter()
        .map(|cell_slice| cell_slice.cell.execution_count)
        .collect();
    assert!(!counts.contains(&Some(3)));
    assert!(!counts.contains(&Some(4)));
}

#[test]
fn a_seed_restricts_the_slice_to_part_of_the_cell() {
    let slicer = make_log(&["x = 1\ny = 2", "a = x\nb = y"]);
    let seed = RangeSet::from_iter([SourceRange::new(1, 0, 1, 5)]);
    let slice = slicer
        .slice_latest_execution_seeded("cell-2", Some(&seed))
        .unwrap();

    let texts: Vec<String> = slice
        .cell_slices
        .iter()
        .map(|cell_slice| cell_slice.text_slice_lines())
        .collect();
    assert_eq!(texts, vec!["x = 1", "a = x"]);
}

#[test]
fn finds_cells_that_use_a_definition() {
    let slicer = make_log(&["x = 3", "y = x+1"]);
    assert_eq!(dependent_texts(&slicer, 0), vec!["y = x+1"]);
}

#[test]
fn tracks_only_the_most_recent_definition() {
    let slicer = make_log(&["x = 3", "y = x+1", "x = 4", "y = x*2"]);
    assert_eq!(dependent_texts(&slicer, 0), vec!["y = x+1"]);
    assert_eq!(dependent_texts(&slicer, 2), vec!["y = x*2"]);
}

#[test]
fn reports_no_dependents_for_self_contained_cells() {
    let slicer = make_log(&["x = 3\nprint(x)", "y = 2\nprint(y)"]);
    assert!(dependent_texts(&slicer, 0).is_empty());
}

#[test]
fn follows_transitive_dependencies() {
    let slicer = make_log(&["x = 3", "y = x+1", "z = y-1"]);
    let texts = dependent_texts(&slicer, 0);
    assert_eq!(texts.len(), 2);
    assert!(texts.contains(&"y = x+1".to_string()));
    assert!(texts.contains(&"z = y-1".to_string()));
}

#[test]
fn finds_dependents_of_each_definition_in_a_cell() {
    let slicer = make_log(&["x = 3\nq = 2", "y = x+1", "z = q-1"]);
    assert_eq!(dependent_texts(&slicer, 0).len(), 2);
}

#[test]
fn a_reexecuted_cell_keeps_its_dependents() {
    let slicer = make_log_with_ids(&[
        ("cell-x", "x = 2\nprint(x)"),
        ("cell-y", "y = x+1\nprint(y)"),
        ("cell-q", "q = 2"),
        ("cell-x", "x = 20\nprint(x)"),
    ]);
    let texts = dependent_texts(&slicer, 3);
    assert_eq!(texts, vec!["y = x+1\nprint(y)"]);
}

#[test]
fn reexecution_can_sever_a_dependency() {
    let slicer = make_log_with_ids(&[
        ("cell-x", "x = 2\nprint(x)"),
        ("cell-y", "y = 3\nprint(y)"),
        ("cell-q", "q = 2"),
        ("cell-x", "x = 20\nprint(x)"),
    ]);
    assert!(dependent_texts(&slicer, 3).is_empty());
}

#[test]
fn returns_dependents_in_topological_order() {
    let slicer = make_log_with_ids(&[
        ("cell-x", "x = 1"),
        ("cell-x", "y = 2*x"),
        ("cell-x", "z = x*y"),
        ("cell-x", "x = 2"),
        ("cell-y", "y = x*2"),
        ("cell-z", "z = y*x"),
        ("cell-x", "x = 3"),
    ]);
    assert_eq!(dependent_texts(&slicer, 6), vec!["y = x*2", "z = y*x"]);
}

#[test]
fn repeated_queries_see_the_latest_log() {
    let mut slicer = make_log_with_ids(&[
        ("cell-x", "x = 1"),
        ("cell-y", "y = 2*x"),
        ("cell-z", "z = x*y"),
    ]);
    assert_eq!(dependent_texts(&slicer, 0), vec!["y = 2*x", "z = x*y"]);

    let more = [
        ("cell-x", "x = 2"),
        ("cell-y", "y = x*2"),
        ("cell-z", "z = y*x"),
        ("cell-x", "x = 3"),
    ];
    for (i, (persistent_id, source)) in more.iter().enumerate() {
        let n = i as u32 + 4;
        slicer.log_execution(Cell::new(
            *source,
            Some(n),
            format!("event-{n}"),
            *persistent_id,
        ));
    }
    assert_eq!(dependent_texts(&slicer, 6), vec!["y = x*2", "z = y*x"]);
}

#[test]
fn stale_executions_have_no_dependents() {
    let slicer = make_log_with_ids(&[
        ("cell-x", "x = 1"),
        ("cell-y", "y = 2*x"),
        ("cell-x", "x = 5"),
    ]);
    // The first run of cell-x is no longer the one in the program.
    assert!(dependent_texts(&slicer, 0).is_empty());
}

#[test]
fn tracks_dependents_through_library_calls() {
    let entries = [
        (
            "cell-imports",
            "from matplotlib.pyplot import scatter\n\
             from sklearn.cluster import KMeans\n\
             from sklearn import datasets",
        ),
        (
            "cell-data",
            "data = datasets.load_iris().data[:,2:4]\n\
             petal_length, petal_width = data[:,1], data[:,0]",
        ),
        ("cell-k", "k=3"),
        ("cell-fit", "clusters = KMeans(n_clusters=k).fit(data).labels_"),
        ("cell-plot", "scatter(petal_length, petal_width, c=clusters)"),
        ("cell-k", "k=4"),
    ];
    let slicer = make_log_with_ids(&entries);
    let texts = dependent_texts(&slicer, 5);
    assert_eq!(texts.len(), 2);
    assert!(texts.contains(&entries[3].1.to_string()));
    assert!(texts.contains(&entries[4].1.to_string()));
}
