// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Structured `if` and `while`.
//!
//! Each open construct is a [Frame] on the builder.  Closing operations must match the
//! innermost frame; anything else fails instead of closing some other block.

use super::ShaderError;
use super::builder::ShaderBuilder;
use super::value::ValB;
use crate::spirv::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoopStage {
    /// Inside the header, waiting for the condition.
    Test,
    Body,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Frame {
    If {
        otherwise: Id,
        merge: Id,
        else_open: bool,
    },
    While {
        header: Id,
        body: Id,
        next: Id,
        merge: Id,
        stage: LoopStage,
    },
}

impl ShaderBuilder {
    /// Opens a selection.  Code up to [ShaderBuilder::else_branch] or
    /// [ShaderBuilder::if_end] runs when `condition` holds.
    pub fn if_begin(&self, condition: ValB<'_>) -> Result<(), ShaderError> {
        let mut guard = self.body_state("if_begin", &[condition.builder])?;
        let st = &mut *guard;
        let taken = st.module.allocate_id();
        let otherwise = st.module.allocate_id();
        let merge = st.module.allocate_id();
        st.module.selection_merge(merge);
        st.module.conditional_jump(condition.id, taken, otherwise);
        st.module.label(Some(taken));
        st.frames.push(Frame::If {
            otherwise,
            merge,
            else_open: false,
        });
        Ok(())
    }

    pub fn else_branch(&self) -> Result<(), ShaderError> {
        let mut guard = self.body_state("else_branch", &[])?;
        let st = &mut *guard;
        let (otherwise, merge) = match st.frames.last_mut() {
            Some(Frame::If {
                otherwise,
                merge,
                else_open,
            }) if !*else_open => {
                *else_open = true;
                (*otherwise, *merge)
            }
            _ => {
                return Err(ShaderError::UnbalancedControl {
                    operation: "else_branch",
                });
            }
        };
        st.module.jump(merge);
        st.module.label(Some(otherwise));
        Ok(())
    }

    pub fn if_end(&self) -> Result<(), ShaderError> {
        let mut guard = self.body_state("if_end", &[])?;
        let st = &mut *guard;
        let Some(Frame::If {
            otherwise,
            merge,
            else_open,
        }) = st.frames.last().cloned()
        else {
            return Err(ShaderError::UnbalancedControl {
                operation: "if_end",
            });
        };
        st.frames.pop();
        st.module.jump(merge);
        if !else_open {
            //the false edge still needs a block of its own
            st.module.label(Some(otherwise));
            st.module.jump(merge);
        }
        st.module.label(Some(merge));
        Ok(())
    }

    /**
    Opens a loop.  The code until [ShaderBuilder::while_condition] is the loop
    header and runs before every test.

    ```
    use kernels_and_words::shader::{ShaderBuilder, I32};
    let shader = ShaderBuilder::new([1, 1, 1], 0);
    let zero = shader.con_i32(0).unwrap();
    let one = shader.con_i32(1).unwrap();
    let ten = shader.con_i32(10).unwrap();
    shader.constants_done().unwrap();
    shader.begin_body().unwrap();
    let i = shader.define_variable::<I32>().unwrap();
    i.set(zero);
    shader.while_begin().unwrap();
    shader.while_condition(i.get().less(ten)).unwrap();
    //body
    shader.while_next().unwrap();
    i.set(i.get() + one);
    shader.while_end().unwrap();
    shader.finish().unwrap();
    ```
    */
    pub fn while_begin(&self) -> Result<(), ShaderError> {
        let mut guard = self.body_state("while_begin", &[])?;
        let st = &mut *guard;
        let header = st.module.allocate_id();
        st.module.jump(header);
        st.module.label(Some(header));
        let test = st.module.allocate_id();
        let body = st.module.allocate_id();
        let next = st.module.allocate_id();
        let merge = st.module.allocate_id();
        st.module.loop_merge(merge, next);
        st.module.jump(test);
        st.module.label(Some(test));
        st.frames.push(Frame::While {
            header,
            body,
            next,
            merge,
            stage: LoopStage::Test,
        });
        Ok(())
    }

    /// Leaves the loop when `condition` is false.  What follows is the body.
    pub fn while_condition(&self, condition: ValB<'_>) -> Result<(), ShaderError> {
        let mut guard = self.body_state("while_condition", &[condition.builder])?;
        let st = &mut *guard;
        let (body, merge) = match st.frames.last_mut() {
            Some(Frame::While {
                body, merge, stage, ..
            }) if *stage == LoopStage::Test => {
                *stage = LoopStage::Body;
                (*body, *merge)
            }
            _ => {
                return Err(ShaderError::UnbalancedControl {
                    operation: "while_condition",
                });
            }
        };
        st.module.conditional_jump(condition.id, body, merge);
        st.module.label(Some(body));
        Ok(())
    }

    /// Ends the body.  What follows is the continue block, run after every iteration.
    pub fn while_next(&self) -> Result<(), ShaderError> {
        let mut guard = self.body_state("while_next", &[])?;
        let st = &mut *guard;
        let next = match st.frames.last_mut() {
            Some(Frame::While { next, stage, .. }) if *stage == LoopStage::Body => {
                *stage = LoopStage::Continue;
                *next
            }
            _ => {
                return Err(ShaderError::UnbalancedControl {
                    operation: "while_next",
                });
            }
        };
        st.module.jump(next);
        st.module.label(Some(next));
        Ok(())
    }

    /// Closes the loop.  If [ShaderBuilder::while_next] was skipped the continue block is empty.
    pub fn while_end(&self) -> Result<(), ShaderError> {
        let mut guard = self.body_state("while_end", &[])?;
        let st = &mut *guard;
        let Some(Frame::While {
            header,
            next,
            merge,
            stage,
            ..
        }) = st.frames.last().cloned()
        else {
            return Err(ShaderError::UnbalancedControl {
                operation: "while_end",
            });
        };
        match stage {
            LoopStage::Test => {
                return Err(ShaderError::UnbalancedControl {
                    operation: "while_end",
                });
            }
            LoopStage::Body => {
                st.module.jump(next);
                st.module.label(Some(next));
            }
            LoopStage::Continue => {}
        }
        st.frames.pop();
        st.module.jump(header);
        st.module.label(Some(merge));
        Ok(())
    }

    /// Number of open `if`/`while` constructs.
    pub fn open_blocks(&self) -> usize {
        self.state.borrow().frames.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::shader::{ShaderBuilder, ShaderError};
    use crate::spirv::{Instructions, Op};

    fn body() -> ShaderBuilder {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        shader.constants_done().unwrap();
        shader.begin_body().unwrap();
        shader
    }

    #[test]
    fn nested_blocks_balance() {
        let shader = body();
        let t = shader.con_bool(true);
        shader.if_begin(t).unwrap();
        shader.while_begin().unwrap();
        shader.while_condition(t).unwrap();
        shader.if_begin(t).unwrap();
        shader.else_branch().unwrap();
        shader.if_end().unwrap();
        shader.while_next().unwrap();
        shader.while_end().unwrap();
        shader.else_branch().unwrap();
        shader.if_end().unwrap();
        assert_eq!(shader.open_blocks(), 0);
        assert!(shader.finish().is_ok());
    }

    #[test]
    fn if_without_else_labels_both_edges() {
        let shader = body();
        let t = shader.con_bool(true);
        shader.if_begin(t).unwrap();
        shader.if_end().unwrap();
        let module = shader.finish().unwrap();
        let branch = Instructions::of_module(module.words())
            .find(|i| i.is(Op::BranchConditional))
            .unwrap();
        let labels: Vec<u32> = Instructions::of_module(module.words())
            .filter(|i| i.is(Op::Label))
            .map(|i| i.operands[0])
            .collect();
        assert!(labels.contains(&branch.operands[1]));
        assert!(labels.contains(&branch.operands[2]));
    }

    #[test]
    fn mismatched_closers_fail() {
        let shader = body();
        let t = shader.con_bool(true);
        assert_eq!(
            shader.if_end(),
            Err(ShaderError::UnbalancedControl { operation: "if_end" })
        );
        assert_eq!(
            shader.else_branch(),
            Err(ShaderError::UnbalancedControl {
                operation: "else_branch"
            })
        );
        shader.while_begin().unwrap();
        //the loop is innermost, so the if closers do not apply
        assert!(shader.if_end().is_err());
        assert!(shader.while_next().is_err());
        assert!(shader.while_end().is_err());
        shader.while_condition(t).unwrap();
        assert!(shader.while_condition(t).is_err());
        shader.while_end().unwrap();

        shader.if_begin(t).unwrap();
        shader.else_branch().unwrap();
        assert!(shader.else_branch().is_err());
        assert!(shader.while_end().is_err());
        assert_eq!(shader.open_blocks(), 1);
        assert_eq!(
            shader.finish().unwrap_err(),
            ShaderError::UnclosedControl { open: 1 }
        );
    }

    #[test]
    fn loop_linkage() {
        let shader = body();
        let t = shader.con_bool(true);
        shader.while_begin().unwrap();
        shader.while_condition(t).unwrap();
        shader.while_next().unwrap();
        shader.while_end().unwrap();
        let module = shader.finish().unwrap();
        let instructions: Vec<_> = Instructions::of_module(module.words())
            .skip_while(|i| !i.is(Op::Function))
            .collect();
        let merge = instructions.iter().find(|i| i.is(Op::LoopMerge)).unwrap();
        let (merge_block, continue_block) = (merge.operands[0], merge.operands[1]);
        let cond = instructions
            .iter()
            .find(|i| i.is(Op::BranchConditional))
            .unwrap();
        assert_eq!(cond.operands[2], merge_block);
        //the continue block jumps back to the header, which holds the merge instruction
        let continue_at = instructions
            .iter()
            .position(|i| i.is(Op::Label) && i.operands[0] == continue_block)
            .unwrap();
        let back = &instructions[continue_at + 1];
        assert!(back.is(Op::Branch));
        let header_at = instructions
            .iter()
            .position(|i| i.is(Op::Label) && i.operands[0] == back.operands[0])
            .unwrap();
        assert!(instructions[header_at + 1].is(Op::LoopMerge));
    }
}
