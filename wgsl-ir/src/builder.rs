#![forbid(unsafe_code)]

use wgsl_ast::Span;

use crate::constant::ConstValue;
use crate::ir::{
    BasicBlock, BindingPoint, BlockId, Function, FunctionId, IdGen, Inst, InstKind,
    IoAttributes, Module, Param, ReturnValue, Stage, Terminator, ValueId, ValueKind,
};
use crate::ty::{Access, AddressSpace, TypeArena, TypeId};

/// Appends instructions to a [`Module`] one block at a time.
///
/// Functions are built one after another: `begin_function`, then blocks and
/// instructions, then `finish_function`.
#[derive(Debug)]
pub struct Builder {
    module: Module,
    ids: IdGen,
    current_fn: Option<usize>,
    current_block: Option<BlockId>,
}

impl Builder {
    pub fn new(types: TypeArena) -> Self {
        Self {
            module: Module {
                types,
                ..Module::default()
            },
            ids: IdGen::default(),
            current_fn: None,
            current_block: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn types(&mut self) -> &mut TypeArena {
        &mut self.module.types
    }

    pub fn constant(&mut self, ty: TypeId, value: ConstValue) -> ValueId {
        self.module.constant(ty, value)
    }

    /// Declares a module-scope variable and returns the pointer to it.
    #[allow(clippy::too_many_arguments)]
    pub fn root_var(
        &mut self,
        span: Span,
        name: impl Into<String>,
        space: AddressSpace,
        access: Access,
        store: TypeId,
        init: Option<ValueId>,
        binding: Option<BindingPoint>,
    ) -> ValueId {
        let ptr_ty = self.module.types.pointer(space, store, access);
        let dest = self.module.new_value(ptr_ty, ValueKind::Inst);
        self.module.root.insts.push(Inst {
            span,
            dest: Some(dest),
            kind: InstKind::Var {
                name: name.into(),
                space,
                access,
                init,
                binding,
            },
        });
        dest
    }

    pub fn root_override(
        &mut self,
        span: Span,
        name: impl Into<String>,
        ty: TypeId,
        id: Option<u32>,
        init: Option<ValueId>,
    ) -> ValueId {
        let dest = self.module.new_value(ty, ValueKind::Inst);
        self.module.root.insts.push(Inst {
            span,
            dest: Some(dest),
            kind: InstKind::Override {
                name: name.into(),
                id,
                init,
            },
        });
        dest
    }

    /// Starts a new function with an empty entry block and makes that block
    /// current.
    pub fn begin_function(
        &mut self,
        name: impl Into<String>,
        span: Span,
        stage: Option<Stage>,
        workgroup_size: Option<[u32; 3]>,
    ) -> FunctionId {
        let id = self.ids.fresh_function();
        let entry = self.ids.fresh_block();
        self.module.functions.push(Function {
            id,
            name: name.into(),
            span,
            stage,
            workgroup_size,
            params: Vec::new(),
            ret: None,
            blocks: vec![BasicBlock {
                id: entry,
                span,
                insts: Vec::new(),
                term: None,
            }],
            entry,
        });
        self.current_fn = Some(self.module.functions.len() - 1);
        self.current_block = Some(entry);
        id
    }

    fn func_mut(&mut self) -> Option<&mut Function> {
        let index = self.current_fn?;
        self.module.functions.get_mut(index)
    }

    pub fn current_function(&self) -> Option<FunctionId> {
        self.current_fn
            .and_then(|i| self.module.functions.get(i))
            .map(|f| f.id)
    }

    pub fn add_param(&mut self, name: impl Into<String>, ty: TypeId, io: IoAttributes) -> ValueId {
        let Some(index) = self.current_fn else {
            return self.module.new_value(ty, ValueKind::Inst);
        };
        let function = self.module.functions[index].id;
        let param_index = self.module.functions[index].params.len() as u32;
        let value = self.module.new_value(
            ty,
            ValueKind::Param {
                function,
                index: param_index,
            },
        );
        self.module.functions[index].params.push(Param {
            name: name.into(),
            ty,
            value,
            io,
        });
        value
    }

    pub fn set_return(&mut self, ty: TypeId, io: IoAttributes) {
        if let Some(f) = self.func_mut() {
            f.ret = Some(ReturnValue { ty, io });
        }
    }

    pub fn create_block(&mut self, span: Span) -> BlockId {
        let id = self.ids.fresh_block();
        if let Some(f) = self.func_mut() {
            f.blocks.push(BasicBlock {
                id,
                span,
                insts: Vec::new(),
                term: None,
            });
        }
        id
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    fn block_mut(&mut self) -> Option<&mut BasicBlock> {
        let id = self.current_block?;
        self.func_mut()?.block_mut(id)
    }

    pub fn is_terminated(&self) -> bool {
        let Some(id) = self.current_block else {
            return true;
        };
        self.current_fn
            .and_then(|i| self.module.functions.get(i))
            .and_then(|f| f.block(id))
            .is_none_or(|b| b.term.is_some())
    }

    /// Code after a terminator goes into a fresh block no edge leads to.
    fn ensure_open_block(&mut self, span: Span) {
        if self.is_terminated() {
            let block = self.create_block(span);
            self.switch_to(block);
        }
    }

    /// Appends an instruction producing a value of type `ty`.
    pub fn inst(&mut self, span: Span, ty: TypeId, kind: InstKind) -> ValueId {
        self.ensure_open_block(span);
        let dest = self.module.new_value(ty, ValueKind::Inst);
        if let Some(block) = self.block_mut() {
            block.insts.push(Inst {
                span,
                dest: Some(dest),
                kind,
            });
        }
        dest
    }

    /// Appends an instruction without a result.
    pub fn effect(&mut self, span: Span, kind: InstKind) {
        self.ensure_open_block(span);
        if let Some(block) = self.block_mut() {
            block.insts.push(Inst {
                span,
                dest: None,
                kind,
            });
        }
    }

    /// Declares a function-scope variable and returns the pointer to it.
    pub fn local_var(
        &mut self,
        span: Span,
        name: impl Into<String>,
        store: TypeId,
        init: Option<ValueId>,
    ) -> ValueId {
        let ptr_ty = self
            .module
            .types
            .pointer(AddressSpace::Function, store, Access::ReadWrite);
        self.inst(
            span,
            ptr_ty,
            InstKind::Var {
                name: name.into(),
                space: AddressSpace::Function,
                access: Access::ReadWrite,
                init,
                binding: None,
            },
        )
    }

    /// Ends the current block. A block that already has a terminator keeps
    /// it.
    pub fn terminate(&mut self, term: Terminator) {
        if let Some(block) = self.block_mut() {
            if block.term.is_none() {
                block.term = Some(term);
            }
        }
    }

    /// Closes every open block of the current function: `return` for
    /// functions without a result, `unreachable` otherwise.
    pub fn finish_function(&mut self) {
        let Some(f) = self.func_mut() else {
            return;
        };
        let fallthrough = if f.ret.is_none() {
            Terminator::Return(None)
        } else {
            Terminator::Unreachable
        };
        for block in &mut f.blocks {
            if block.term.is_none() {
                block.term = Some(fallthrough.clone());
            }
        }
        log::trace!("built function '{}' with {} blocks", f.name, f.blocks.len());
        self.current_fn = None;
        self.current_block = None;
    }

    pub fn finish(self) -> Module {
        log::debug!(
            "built IR module: {} functions, {} root instructions, {} values",
            self.module.functions.len(),
            self.module.root.insts.len(),
            self.module.values.len()
        );
        self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ScalarValue;
    use crate::ir::BinOp;

    #[test]
    fn builds_function_with_return() {
        let mut b = Builder::new(TypeArena::new());
        let i32_ty = b.types().i32();
        b.begin_function("f", Span::from(0..0), None, None);
        b.set_return(i32_ty, IoAttributes::default());
        let one = b.constant(i32_ty, ConstValue::Scalar(ScalarValue::I32(1)));
        let sum = b.inst(
            Span::from(0..0),
            i32_ty,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: one,
                rhs: one,
            },
        );
        b.terminate(Terminator::Return(Some(sum)));
        b.finish_function();
        let module = b.finish();
        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].term, Some(Terminator::Return(Some(sum))));
    }

    #[test]
    fn code_after_return_lands_in_detached_block() {
        let mut b = Builder::new(TypeArena::new());
        b.begin_function("f", Span::from(0..0), None, None);
        b.terminate(Terminator::Return(None));
        b.effect(Span::from(0..0), InstKind::Discard);
        b.finish_function();
        let module = b.finish();
        let f = &module.functions[0];
        assert_eq!(f.blocks.len(), 2);
        assert!(f.blocks.iter().all(|blk| blk.term.is_some()));
    }
}
