//! L 逻辑链：依赖图拓扑排序与关键路径
//!
//! 邻接表 + 入度表（Kahn）。就绪集合按 (priority 降序, 分解位置升序) 取出，
//! 保证同优先级时保持分解顺序。有环时返回 CyclicDependency，由 chain() 捕获并退化为分解顺序，
//! 此时关键路径只在环之外能排出拓扑序的子目标中求。

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::AgentError;
use crate::rrla::{LogicChain, ScoredSubgoal};

struct DependencyGraph {
    /// 位置 -> 依赖该子目标的位置
    adjacency: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    /// 位置 -> 其依赖的位置
    parents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    fn new(scored: &[ScoredSubgoal]) -> Self {
        let index: HashMap<usize, usize> = scored
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.subgoal.id, pos))
            .collect();
        let n = scored.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut in_degree = vec![0; n];
        let mut parents = vec![Vec::new(); n];

        for (pos, s) in scored.iter().enumerate() {
            for dep in &s.subgoal.depends_on {
                if let Some(&from) = index.get(dep) {
                    if from != pos && !parents[pos].contains(&from) {
                        adjacency[from].push(pos);
                        parents[pos].push(from);
                        in_degree[pos] += 1;
                    }
                }
            }
        }
        Self {
            adjacency,
            in_degree,
            parents,
        }
    }
}

/// 拓扑执行顺序（子目标 id）
pub fn topological_order(scored: &[ScoredSubgoal]) -> Result<Vec<usize>, AgentError> {
    let (order, stuck) = kahn(scored);
    if !stuck.is_empty() {
        return Err(AgentError::CyclicDependency(stuck));
    }
    Ok(order)
}

/// 返回 (能排出的拓扑序, 卡在环上或环下游的子目标)，均为 id
fn kahn(scored: &[ScoredSubgoal]) -> (Vec<usize>, Vec<usize>) {
    let mut graph = DependencyGraph::new(scored);
    let mut ready: BTreeSet<(Reverse<i64>, usize)> = graph
        .in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(pos, _)| (Reverse(scored[pos].priority), pos))
        .collect();

    let mut order = Vec::with_capacity(scored.len());
    while let Some(next) = ready.pop_first() {
        let pos = next.1;
        order.push(pos);
        for &child in &graph.adjacency[pos] {
            graph.in_degree[child] -= 1;
            if graph.in_degree[child] == 0 {
                ready.insert((Reverse(scored[child].priority), child));
            }
        }
    }

    let stuck: Vec<usize> = graph
        .in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > 0)
        .map(|(pos, _)| scored[pos].subgoal.id)
        .collect();
    let order = order.into_iter().map(|pos| scored[pos].subgoal.id).collect();
    (order, stuck)
}

/// 最长依赖链（按 sequence 的拓扑顺序做 DP）；并列时取先出现的
pub fn critical_path(scored: &[ScoredSubgoal], sequence: &[usize]) -> Vec<usize> {
    let graph = DependencyGraph::new(scored);
    let pos_of: HashMap<usize, usize> = scored
        .iter()
        .enumerate()
        .map(|(pos, s)| (s.subgoal.id, pos))
        .collect();

    let mut length = vec![0usize; scored.len()];
    let mut prev: Vec<Option<usize>> = vec![None; scored.len()];
    for id in sequence {
        let Some(&pos) = pos_of.get(id) else { continue };
        length[pos] = 1;
        for &parent in &graph.parents[pos] {
            if length[parent] + 1 > length[pos] {
                length[pos] = length[parent] + 1;
                prev[pos] = Some(parent);
            }
        }
    }

    let mut best: Option<usize> = None;
    for id in sequence {
        if let Some(&pos) = pos_of.get(id) {
            if best.map_or(true, |b| length[pos] > length[b]) {
                best = Some(pos);
            }
        }
    }

    let mut path = Vec::new();
    let mut cursor = best;
    while let Some(pos) = cursor {
        path.push(scored[pos].subgoal.id);
        cursor = prev[pos];
    }
    path.reverse();
    path
}

/// 构建逻辑链；依赖环退化为分解顺序，关键路径不含环上的子目标
pub fn chain(scored: &[ScoredSubgoal]) -> LogicChain {
    let dependencies: BTreeMap<usize, Vec<usize>> = scored
        .iter()
        .filter(|s| !s.subgoal.depends_on.is_empty())
        .map(|s| (s.subgoal.id, s.subgoal.depends_on.clone()))
        .collect();

    match topological_order(scored) {
        Ok(sequence) => LogicChain {
            critical_path: critical_path(scored, &sequence),
            sequence,
            dependencies,
            cyclic_fallback: false,
        },
        Err(err) => {
            tracing::warn!(error = %err, "dependency cycle, using decomposition order");
            let (acyclic, _) = kahn(scored);
            let sequence: Vec<usize> = scored.iter().map(|s| s.subgoal.id).collect();
            LogicChain {
                critical_path: critical_path(scored, &acyclic),
                sequence,
                dependencies,
                cyclic_fallback: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrla::Subgoal;

    fn scored(specs: &[(usize, i64, &[usize])]) -> Vec<ScoredSubgoal> {
        specs
            .iter()
            .map(|(id, priority, deps)| ScoredSubgoal {
                subgoal: Subgoal::new(*id, format!("step {id}")).after(deps),
                feasibility: 0.8,
                priority: *priority,
                risks: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_dependencies_respected() {
        let s = scored(&[(1, 1, &[2]), (2, 1, &[]), (3, 9, &[1])]);
        assert_eq!(topological_order(&s).unwrap(), vec![2, 1, 3]);
    }

    #[test]
    fn test_ready_set_by_priority_then_position() {
        let s = scored(&[(1, 2, &[]), (2, 5, &[]), (3, 2, &[])]);
        assert_eq!(topological_order(&s).unwrap(), vec![2, 1, 3]);
    }

    #[test]
    fn test_cycle_is_error_and_chain_falls_back() {
        let s = scored(&[(1, 3, &[]), (2, 2, &[3]), (3, 1, &[2])]);
        let err = topological_order(&s).unwrap_err();
        assert_eq!(err, AgentError::CyclicDependency(vec![2, 3]));

        let chain = chain(&s);
        assert!(chain.cyclic_fallback);
        assert_eq!(chain.sequence, vec![1, 2, 3]);
        assert_eq!(chain.critical_path, vec![1]);
    }

    #[test]
    fn test_cycle_critical_path_excludes_cycle_members() {
        let s = scored(&[(1, 1, &[]), (2, 1, &[1]), (3, 1, &[4]), (4, 1, &[3]), (5, 1, &[3])]);
        let chain = chain(&s);
        assert!(chain.cyclic_fallback);
        assert_eq!(chain.sequence, vec![1, 2, 3, 4, 5]);
        assert_eq!(chain.critical_path, vec![1, 2]);

        let all_cyclic = scored(&[(1, 1, &[2]), (2, 1, &[1])]);
        assert!(super::chain(&all_cyclic).critical_path.is_empty());
    }

    #[test]
    fn test_critical_path_is_longest_chain() {
        let s = scored(&[(1, 4, &[]), (2, 3, &[1]), (3, 2, &[]), (4, 1, &[2])]);
        let chain = chain(&s);
        assert_eq!(chain.critical_path, vec![1, 2, 4]);
        assert_eq!(chain.dependencies.get(&4), Some(&vec![2]));
    }

    #[test]
    fn test_independent_steps_critical_path_is_first() {
        let s = scored(&[(1, 2, &[]), (2, 1, &[])]);
        assert_eq!(chain(&s).critical_path, vec![1]);
    }
}
