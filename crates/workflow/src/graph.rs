//! 工作流依赖图的构建与校验
//!
//! 注册和每次执行开始时都会校验：依赖必须指向同一工作流内
//! 已定义的步骤，且依赖图必须无环。

use std::collections::{HashMap, HashSet};

use pagewatch_core::{PagewatchError, PagewatchResult, WorkflowDefinition, WorkflowStep};

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Grey,
    Black,
}

/// 校验工作流定义的依赖图
pub fn validate(def: &WorkflowDefinition) -> PagewatchResult<()> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, step) in def.steps.iter().enumerate() {
        if index.insert(step.step_id.as_str(), i).is_some() {
            return Err(PagewatchError::Configuration(format!(
                "工作流 {} 中步骤ID {} 重复",
                def.workflow_id, step.step_id
            )));
        }
    }

    // 邻接表：步骤 -> 其依赖
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); def.steps.len()];
    for (i, step) in def.steps.iter().enumerate() {
        for dep in &step.depends_on {
            match index.get(dep.as_str()) {
                Some(&j) => adjacency[i].push(j),
                None => {
                    return Err(PagewatchError::UnknownStepDependency {
                        step: step.step_id.clone(),
                        missing: dep.clone(),
                    })
                }
            }
        }
    }

    if has_cycle(&adjacency) {
        return Err(PagewatchError::CircularDependency {
            workflow_id: def.workflow_id.clone(),
        });
    }
    Ok(())
}

/// 显式工作栈DFS检测环，避免递归深度问题
///
/// 灰色节点在当前DFS路径上，任何指回灰色节点的边都是环。
fn has_cycle(adjacency: &[Vec<usize>]) -> bool {
    let mut colors = vec![Color::White; adjacency.len()];
    // (节点, 下一条待处理的边下标)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..adjacency.len() {
        if colors[start] != Color::White {
            continue;
        }
        stack.push((start, 0));
        colors[start] = Color::Grey;

        while let Some(&mut (node, ref mut edge)) = stack.last_mut() {
            if *edge < adjacency[node].len() {
                let next = adjacency[node][*edge];
                *edge += 1;
                match colors[next] {
                    Color::White => {
                        colors[next] = Color::Grey;
                        stack.push((next, 0));
                    }
                    Color::Grey => return true,
                    Color::Black => {}
                }
            } else {
                colors[node] = Color::Black;
                stack.pop();
            }
        }
    }
    false
}

/// 计算当前可执行的步骤：依赖全部已完成且自身尚未运行
pub fn ready_steps<'a>(
    def: &'a WorkflowDefinition,
    completed: &HashSet<String>,
) -> Vec<&'a WorkflowStep> {
    def.steps
        .iter()
        .filter(|step| {
            !completed.contains(&step.step_id)
                && step.depends_on.iter().all(|dep| completed.contains(dep))
        })
        .collect()
}
