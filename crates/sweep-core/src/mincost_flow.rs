//! A small, hand-rolled minimum-cost maximum-flow solver: successive
//! shortest augmenting paths with Johnson potentials (Bellman-Ford seeds
//! the potentials on the first augmentation, Dijkstra-with-reduced-costs
//! handles the rest). Intentionally not pulled from a crate — per spec §4.3
//! this and Hierholzer are "the two places where real engineering lives".
//!
//! Operates on an explicit small integer-node graph (supply/demand nodes
//! plus a super-source/sink), not on `RouteGraph` directly — `CPPSolver`
//! builds this network from per-SCC degree imbalances.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct EdgeRec {
    to: usize,
    cap: i64,
    cost: i64,
    rev: usize,
}

pub struct MinCostFlow {
    graph: Vec<Vec<EdgeRec>>,
}

#[derive(PartialEq)]
struct HeapItem(i64, usize);

impl Eq for HeapItem {}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl MinCostFlow {
    pub fn new(n: usize) -> Self {
        Self {
            graph: vec![Vec::new(); n],
        }
    }

    /// Adds a directed arc, returning its index within `from`'s adjacency
    /// list for later use with [`Self::flow_through`].
    pub fn add_edge(&mut self, from: usize, to: usize, cap: i64, cost: i64) -> usize {
        let rev_from = self.graph[to].len();
        let rev_to = self.graph[from].len();
        let idx = self.graph[from].len();
        self.graph[from].push(EdgeRec {
            to,
            cap,
            cost,
            rev: rev_from,
        });
        self.graph[to].push(EdgeRec {
            to: from,
            cap: 0,
            cost: -cost,
            rev: rev_to,
        });
        idx
    }

    /// Flow carried on the arc added at `(from, edge_idx)`: original
    /// capacity minus whatever residual capacity remains after `solve`.
    pub fn flow_through(&self, from: usize, edge_idx: usize, original_cap: i64) -> i64 {
        original_cap - self.graph[from][edge_idx].cap
    }

    /// Runs successive shortest augmenting paths from `source` to `sink`
    /// until no augmenting path remains (or flow saturates). Returns
    /// `(total_flow, total_cost)`; read individual arc flows back with
    /// [`Self::flow_through`].
    pub fn solve(&mut self, source: usize, sink: usize) -> (i64, i64) {
        let n = self.graph.len();
        let mut total_flow = 0i64;
        let mut total_cost = 0i64;
        let mut potential = vec![0i64; n];

        // Seed potentials with Bellman-Ford (handles the initial all-non-negative
        // costs fine, and establishes a valid potential for Johnson's technique).
        bellman_ford(&self.graph, source, &mut potential);

        loop {
            let (dist, prev_node, prev_edge) = dijkstra_with_potentials(&self.graph, source, &potential);
            if dist[sink] == i64::MAX {
                break;
            }
            for v in 0..n {
                if dist[v] < i64::MAX {
                    potential[v] += dist[v];
                }
            }

            // Bottleneck capacity along the path.
            let mut bottleneck = i64::MAX;
            let mut v = sink;
            while v != source {
                let u = prev_node[v];
                let e = prev_edge[v];
                bottleneck = bottleneck.min(self.graph[u][e].cap);
                v = u;
            }
            if bottleneck == 0 || bottleneck == i64::MAX {
                break;
            }

            let mut v = sink;
            while v != source {
                let u = prev_node[v];
                let e = prev_edge[v];
                self.graph[u][e].cap -= bottleneck;
                let rev = self.graph[u][e].rev;
                self.graph[v][rev].cap += bottleneck;
                total_cost += self.graph[u][e].cost * bottleneck;
                v = u;
            }
            total_flow += bottleneck;
        }

        (total_flow, total_cost)
    }
}

fn bellman_ford(graph: &[Vec<EdgeRec>], source: usize, potential: &mut [i64]) {
    let n = graph.len();
    let mut dist = vec![i64::MAX / 2; n];
    dist[source] = 0;
    for _ in 0..n {
        let mut updated = false;
        for u in 0..n {
            if dist[u] == i64::MAX / 2 {
                continue;
            }
            for e in &graph[u] {
                if e.cap > 0 && dist[u] + e.cost < dist[e.to] {
                    dist[e.to] = dist[u] + e.cost;
                    updated = true;
                }
            }
        }
        if !updated {
            break;
        }
    }
    for v in 0..n {
        potential[v] = if dist[v] == i64::MAX / 2 { 0 } else { dist[v] };
    }
}

#[allow(clippy::type_complexity)]
fn dijkstra_with_potentials(
    graph: &[Vec<EdgeRec>],
    source: usize,
    potential: &[i64],
) -> (Vec<i64>, Vec<usize>, Vec<usize>) {
    let n = graph.len();
    let mut dist = vec![i64::MAX; n];
    let mut prev_node = vec![usize::MAX; n];
    let mut prev_edge = vec![usize::MAX; n];
    dist[source] = 0;
    let mut heap = BinaryHeap::new();
    heap.push(HeapItem(0, source));

    while let Some(HeapItem(d, u)) = heap.pop() {
        if d > dist[u] {
            continue;
        }
        for (ei, e) in graph[u].iter().enumerate() {
            if e.cap <= 0 {
                continue;
            }
            let reduced = e.cost + potential[u] - potential[e.to];
            let nd = d + reduced;
            if nd < dist[e.to] {
                dist[e.to] = nd;
                prev_node[e.to] = u;
                prev_edge[e.to] = ei;
                heap.push(HeapItem(nd, e.to));
            }
        }
    }

    // Convert reduced distances back to true distances for the caller's
    // potential-update step (`dist[v] - potential[source] + potential[v]`
    // collapses to `dist[v]` here since `potential[source]` is always 0 on
    // entry to a fresh round — Johnson's invariant).
    (dist, prev_node, prev_edge)
}
