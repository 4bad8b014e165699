//! Finalize-time checks for defined functions.
//!
//! The builder accepts blocks in any order and forward branch targets, so the
//! shape of the control-flow graph can only be checked once construction is
//! over. A function passes when:
//! - it has at least one block,
//! - every block ends in exactly one terminator, placed last,
//! - every branch target exists,
//! - every register read in a reachable block is defined earlier in the same
//!   block or in a block that dominates it.

use super::error::ValidationError;
use super::function::{BlockId, DefinedFunction, Reg};

pub fn validate_function(func: &DefinedFunction) -> Result<(), ValidationError> {
    let name = &func.signature.name;
    if func.blocks.is_empty() {
        return Err(ValidationError::EmptyFunction {
            function: name.clone(),
        });
    }

    for (index, block) in func.blocks.iter().enumerate() {
        let id = BlockId(index as u32);
        let Some(last) = block.ops.last() else {
            return Err(ValidationError::MissingTerminator {
                function: name.clone(),
                block: id,
            });
        };
        if !last.is_terminator() {
            return Err(ValidationError::MissingTerminator {
                function: name.clone(),
                block: id,
            });
        }
        if block.ops[..block.ops.len() - 1]
            .iter()
            .any(|op| op.is_terminator())
        {
            return Err(ValidationError::TerminatorNotLast {
                function: name.clone(),
                block: id,
            });
        }
        for target in last.successors() {
            if target.index() >= func.blocks.len() {
                return Err(ValidationError::BranchTargetOutOfRange {
                    function: name.clone(),
                    block: id,
                    target,
                });
            }
        }
    }

    check_dominance(func)
}

/// Block and position of the operation defining each register.
fn definition_sites(func: &DefinedFunction) -> Vec<Option<(usize, usize)>> {
    let mut sites = vec![None; func.reg_types.len()];
    for (b, block) in func.blocks.iter().enumerate() {
        for (i, op) in block.ops.iter().enumerate() {
            if let Some(site) = op.target().and_then(|reg| sites.get_mut(reg.index())) {
                *site = Some((b, i));
            }
        }
    }
    sites
}

/// Classic iterative dominator sets; `None` marks unreachable blocks.
fn dominators(func: &DefinedFunction) -> Vec<Option<Vec<bool>>> {
    let n = func.blocks.len();
    let successors: Vec<Vec<usize>> = func
        .blocks
        .iter()
        .map(|block| {
            block
                .terminator()
                .map(|t| t.successors().into_iter().map(BlockId::index).collect())
                .unwrap_or_default()
        })
        .collect();

    let mut reachable = vec![false; n];
    let mut worklist = vec![0];
    reachable[0] = true;
    while let Some(b) = worklist.pop() {
        for &s in &successors[b] {
            if !reachable[s] {
                reachable[s] = true;
                worklist.push(s);
            }
        }
    }

    let mut predecessors = vec![Vec::new(); n];
    for (b, succs) in successors.iter().enumerate() {
        if reachable[b] {
            for &s in succs {
                predecessors[s].push(b);
            }
        }
    }

    let mut dom: Vec<Option<Vec<bool>>> = (0..n)
        .map(|b| reachable[b].then(|| vec![true; n]))
        .collect();
    let mut entry = vec![false; n];
    entry[0] = true;
    dom[0] = Some(entry);

    let mut changed = true;
    while changed {
        changed = false;
        for b in 1..n {
            if !reachable[b] {
                continue;
            }
            let mut set = vec![true; n];
            for &p in &predecessors[b] {
                if let Some(pdom) = &dom[p] {
                    for (bit, &p_bit) in set.iter_mut().zip(pdom) {
                        *bit &= p_bit;
                    }
                }
            }
            set[b] = true;
            if dom[b].as_ref() != Some(&set) {
                dom[b] = Some(set);
                changed = true;
            }
        }
    }
    dom
}

fn check_dominance(func: &DefinedFunction) -> Result<(), ValidationError> {
    let sites = definition_sites(func);
    let dom = dominators(func);

    for (b, block) in func.blocks.iter().enumerate() {
        let Some(dominated_by) = &dom[b] else {
            continue;
        };
        for (i, op) in block.ops.iter().enumerate() {
            for reg in op.uses() {
                let ok = match sites.get(reg.index()).copied().flatten() {
                    Some((db, di)) if db == b => di < i,
                    Some((db, _)) => dominated_by[db],
                    None => false,
                };
                if !ok {
                    return Err(not_dominated(func, b, reg));
                }
            }
        }
    }
    Ok(())
}

fn not_dominated(func: &DefinedFunction, block: usize, reg: Reg) -> ValidationError {
    ValidationError::UseNotDominated {
        function: func.signature.name.clone(),
        block: BlockId(block as u32),
        reg,
    }
}
