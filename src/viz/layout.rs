use crate::data::graph::GeneGraph;
use petgraph::graph::{NodeIndex, UnGraph};
use rand::Rng;

use crate::utils::random::seeded_rng;

/// Seed used for reproducible layouts
pub const LAYOUT_SEED: u64 = 42;

/// Undirected view of the gene graph; parallel and reversed edges collapse into one
pub fn to_undirected_graph(graph: &GeneGraph) -> UnGraph<usize, ()> {
    let mut ungraph = UnGraph::with_capacity(graph.num_nodes(), graph.num_edges());
    let nodes: Vec<NodeIndex> = (0..graph.num_nodes()).map(|i| ungraph.add_node(i)).collect();

    for (s, t) in graph.edges() {
        ungraph.update_edge(nodes[s], nodes[t], ());
    }

    ungraph
}

/// Force-directed layout parameters
#[derive(Debug, Clone, Copy)]
pub struct SpringLayout {
    /// Number of cooling iterations
    pub iterations: usize,
    /// Seed for the initial positions
    pub seed: u64,
}

impl Default for SpringLayout {
    fn default() -> Self {
        Self {
            iterations: 50,
            seed: LAYOUT_SEED,
        }
    }
}

impl SpringLayout {
    /// Fruchterman-Reingold positions rescaled to `[-1, 1]`
    pub fn positions(&self, graph: &UnGraph<usize, ()>) -> Vec<(f64, f64)> {
        let n = graph.node_count();
        match n {
            0 => return Vec::new(),
            1 => return vec![(0.0, 0.0)],
            _ => {}
        }

        let mut rng = seeded_rng(self.seed);
        let mut pos: Vec<[f64; 2]> = (0..n).map(|_| [rng.gen::<f64>(), rng.gen::<f64>()]).collect();

        let k = (1.0 / n as f64).sqrt();
        let mut t = extent(&pos) * 0.1;
        let dt = t / (self.iterations + 1) as f64;

        let neighbors: Vec<Vec<usize>> = graph.node_indices()
            .map(|a| {
                graph.neighbors(a)
                    .map(|b| b.index())
                    .filter(|&b| b != a.index())
                    .collect()
            })
            .collect();

        for _ in 0..self.iterations {
            let mut displacement = vec![[0.0f64; 2]; n];
            for i in 0..n {
                // repulsion from every other node
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let (delta, distance) = offset(&pos, i, j);
                    let force = k * k / (distance * distance);
                    displacement[i][0] += delta[0] * force;
                    displacement[i][1] += delta[1] * force;
                }
                // attraction along edges
                for &j in &neighbors[i] {
                    let (delta, distance) = offset(&pos, i, j);
                    let force = distance / k;
                    displacement[i][0] -= delta[0] * force;
                    displacement[i][1] -= delta[1] * force;
                }
            }

            for (p, d) in pos.iter_mut().zip(&displacement) {
                let length = (d[0] * d[0] + d[1] * d[1]).sqrt().max(0.01);
                p[0] += d[0] * t / length;
                p[1] += d[1] * t / length;
            }
            t -= dt;
        }

        rescale(&mut pos);
        pos.into_iter().map(|[x, y]| (x, y)).collect()
    }
}

fn offset(pos: &[[f64; 2]], i: usize, j: usize) -> ([f64; 2], f64) {
    let delta = [pos[i][0] - pos[j][0], pos[i][1] - pos[j][1]];
    let distance = (delta[0] * delta[0] + delta[1] * delta[1]).sqrt().max(0.01);
    (delta, distance)
}

fn extent(pos: &[[f64; 2]]) -> f64 {
    (0..2)
        .map(|axis| {
            let (lo, hi) = pos.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[axis]), hi.max(p[axis]))
            });
            hi - lo
        })
        .fold(0.0, f64::max)
}

/// Center on the mean and scale so the largest coordinate is 1
fn rescale(pos: &mut [[f64; 2]]) {
    let n = pos.len() as f64;
    for axis in 0..2 {
        let mean = pos.iter().map(|p| p[axis]).sum::<f64>() / n;
        for p in pos.iter_mut() {
            p[axis] -= mean;
        }
    }

    let lim = pos.iter().flat_map(|p| p.iter()).fold(0.0f64, |m, v| m.max(v.abs()));
    if lim > 0.0 {
        for p in pos.iter_mut() {
            p[0] /= lim;
            p[1] /= lim;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(n: usize) -> UnGraph<usize, ()> {
        let mut g = UnGraph::new_undirected();
        let nodes: Vec<NodeIndex> = (0..n).map(|i| g.add_node(i)).collect();
        for w in nodes.windows(2) {
            g.add_edge(w[0], w[1], ());
        }
        g
    }

    #[test]
    fn test_layout_is_bounded_and_repeatable() {
        let g = path_graph(6);
        let layout = SpringLayout::default();

        let first = layout.positions(&g);
        let second = layout.positions(&g);
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);

        let max = first.iter().map(|(x, y)| x.abs().max(y.abs())).fold(0.0, f64::max);
        assert!((max - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_neighbors_end_up_closer() {
        // 0-1 linked, 2 isolated
        let mut g = UnGraph::<usize, ()>::new_undirected();
        let a = g.add_node(0);
        let b = g.add_node(1);
        g.add_node(2);
        g.add_edge(a, b, ());

        let pos = SpringLayout { iterations: 200, ..SpringLayout::default() }.positions(&g);
        let dist = |i: usize, j: usize| ((pos[i].0 - pos[j].0).powi(2) + (pos[i].1 - pos[j].1).powi(2)).sqrt();
        assert!(dist(0, 1) < dist(0, 2));
        assert!(dist(0, 1) < dist(1, 2));
    }

    #[test]
    fn test_self_loops_exert_no_force() {
        let plain = path_graph(4);
        let mut looped = path_graph(4);
        looped.add_edge(NodeIndex::new(2), NodeIndex::new(2), ());

        let layout = SpringLayout::default();
        assert_eq!(layout.positions(&plain), layout.positions(&looped));
    }

    #[test]
    fn test_sparse_graph_with_many_nodes() {
        let g = path_graph(3000);
        let pos = SpringLayout { iterations: 1, ..SpringLayout::default() }.positions(&g);
        assert_eq!(pos.len(), 3000);
        assert!(pos.iter().all(|(x, y)| x.is_finite() && y.is_finite()));
    }

    #[test]
    fn test_tiny_graphs() {
        assert!(SpringLayout::default().positions(&UnGraph::new_undirected()).is_empty());
        assert_eq!(SpringLayout::default().positions(&path_graph(1)), vec![(0.0, 0.0)]);
    }
}
