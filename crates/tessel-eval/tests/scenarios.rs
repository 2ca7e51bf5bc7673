//! End-to-end reduce scenarios through compile and eval.

use tessel_arena::Arena;
use tessel_eval::{OwnedCells, OwnedValue, Program, TypedCells};
use tessel_tensor_ir::graph::{Graph, NodeId};
use tessel_tensor_ir::optimize::{optimize_graph, DEFAULT_RULES};
use tessel_tensor_ir::{Aggr, CellType, ValueType};

/// Builds `reduce(param0, aggr, dim)` and returns the optimized root.
fn single_reduce(ty: &ValueType, aggr: Aggr, dim: &str) -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let x = graph.inject(0, ty.clone());
    let r = graph.reduce(x, aggr, &[dim]).unwrap();
    let report = optimize_graph(&mut graph, r, DEFAULT_RULES);
    assert_eq!(report.rewrites.len(), 1);
    (graph, report.root)
}

fn run(graph: &Graph, root: NodeId, input: TypedCells<'_>) -> OwnedValue {
    let program = Program::compile(graph, root).unwrap();
    let arena = Arena::new();
    program.eval(&arena, &[input]).unwrap().to_owned_value()
}

// =========================================================================
// Reduce scenarios
// =========================================================================

#[test]
fn test_sum_middle_axis() {
    let ty: ValueType = "tensor(a[2],b[3],c[4])".parse().unwrap();
    let (graph, root) = single_reduce(&ty, Aggr::Sum, "b");
    assert_eq!(graph.to_expr_string(root), "dense_single_reduce(param0,sum,#1)");

    let cells: Vec<f64> = (0..24).map(f64::from).collect();
    let out = run(&graph, root, TypedCells::Double(&cells));

    assert_eq!(out.ty.to_string(), "tensor(a[2],c[4])");
    let OwnedCells::Double(out) = out.cells else {
        panic!("expected double cells");
    };
    assert_eq!(out.len(), 8);
    // out[0][0] = 0 + 4 + 8, out[1][3] = 15 + 19 + 23
    assert_eq!(out[0], 12.0);
    assert_eq!(out[4 + 3], 57.0);
}

#[test]
fn test_count_rank_one_includes_non_finite() {
    let ty: ValueType = "tensor<float>(n[5])".parse().unwrap();
    let (graph, root) = single_reduce(&ty, Aggr::Count, "n");

    let cells = [1.0f32, f32::NAN, -3.5, f32::INFINITY, 0.0];
    let out = run(&graph, root, TypedCells::Float(&cells));

    assert_eq!(out.ty, ValueType::scalar(CellType::Float));
    assert_eq!(out.as_scalar(), Some(5.0));
}

#[test]
fn test_max_first_axis() {
    let ty: ValueType = "tensor(r[3],c[2])".parse().unwrap();
    let (graph, root) = single_reduce(&ty, Aggr::Max, "r");

    let cells = [1.0, 9.0, 7.0, 2.0, 3.0, 8.0];
    let out = run(&graph, root, TypedCells::Double(&cells));

    assert_eq!(out.ty.to_string(), "tensor(c[2])");
    assert_eq!(out.cells, OwnedCells::Double(vec![7.0, 9.0]));
}

#[test]
fn test_min_last_axis_float() {
    let ty: ValueType = "tensor<float>(r[2],c[3])".parse().unwrap();
    let (graph, root) = single_reduce(&ty, Aggr::Min, "c");

    let cells = [4.0f32, -1.0, 2.0, 0.5, 0.25, 8.0];
    let out = run(&graph, root, TypedCells::Float(&cells));

    assert_eq!(out.cells, OwnedCells::Float(vec![-1.0, 0.25]));
}

#[test]
fn test_prod_and_avg() {
    let ty: ValueType = "tensor(x[2],y[2])".parse().unwrap();
    let cells = [2.0, 3.0, 4.0, 5.0];

    let (graph, root) = single_reduce(&ty, Aggr::Prod, "x");
    let out = run(&graph, root, TypedCells::Double(&cells));
    assert_eq!(out.cells, OwnedCells::Double(vec![8.0, 15.0]));

    let (graph, root) = single_reduce(&ty, Aggr::Avg, "y");
    let out = run(&graph, root, TypedCells::Double(&cells));
    assert_eq!(out.cells, OwnedCells::Double(vec![2.5, 4.5]));
}

#[test]
fn test_size_one_axis_is_identity() {
    let ty: ValueType = "tensor(a[3],b[1])".parse().unwrap();
    let cells = [1.5, -2.0, 7.0];
    for aggr in [Aggr::Sum, Aggr::Prod, Aggr::Max, Aggr::Min, Aggr::Avg] {
        let (graph, root) = single_reduce(&ty, aggr, "b");
        let out = run(&graph, root, TypedCells::Double(&cells));
        assert_eq!(out.cells, OwnedCells::Double(cells.to_vec()), "{aggr}");
    }
}

// =========================================================================
// Unoptimized fallback
// =========================================================================

#[test]
fn test_generic_reduce_matches_single_reduce() {
    let ty: ValueType = "tensor(a[2],b[3],c[4])".parse().unwrap();
    let cells: Vec<f64> = (0..24).map(|i| f64::from(i) * 0.5 - 3.0).collect();

    for aggr in Aggr::ALL {
        for dim in ["a", "b", "c"] {
            let mut graph = Graph::new();
            let x = graph.inject(0, ty.clone());
            let r = graph.reduce(x, aggr, &[dim]).unwrap();
            let slow = run(&graph, r, TypedCells::Double(&cells));

            let report = optimize_graph(&mut graph, r, DEFAULT_RULES);
            let fast = run(&graph, report.root, TypedCells::Double(&cells));
            assert_eq!(fast, slow, "{aggr} over {dim}");
        }
    }
}

#[test]
fn test_reduce_all_dimensions() {
    let ty: ValueType = "tensor(a[2],b[3])".parse().unwrap();
    let mut graph = Graph::new();
    let x = graph.inject(0, ty);
    let none: &[&str] = &[];
    let r = graph.reduce(x, Aggr::Sum, none).unwrap();
    let report = optimize_graph(&mut graph, r, DEFAULT_RULES);
    assert!(report.is_unchanged());

    let cells = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let out = run(&graph, report.root, TypedCells::Double(&cells));
    assert_eq!(out.as_scalar(), Some(21.0));
}

// =========================================================================
// Concurrency
// =========================================================================

#[test]
fn test_concurrent_evaluations_agree() {
    let ty: ValueType = "tensor(a[4],b[8],c[16])".parse().unwrap();
    let (graph, root) = single_reduce(&ty, Aggr::Sum, "b");
    let program = Program::compile(&graph, root).unwrap();
    let cells: Vec<f64> = (0..512).map(|i| f64::from(i % 17) - 8.0).collect();

    let expected = {
        let arena = Arena::new();
        program
            .eval(&arena, &[TypedCells::Double(&cells)])
            .unwrap()
            .to_owned_value()
    };

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let arena = Arena::new();
                    program
                        .eval(&arena, &[TypedCells::Double(&cells)])
                        .unwrap()
                        .to_owned_value()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
