// This module provides the two containers IR lives in. A Module is the mutable construction
// state: it owns every function declaration in an index-addressed arena, a symbol table from
// names to function ids, and the registry of user types. Functions are declared first (so
// that bodies can call themselves or each other) and then filled in through a
// FunctionBuilder. Module::finalize validates every defined function and produces a Program,
// the immutable form accepted by the interpreter and the trampoline generator. The Program
// caches the frame layout and argument layout of each function, so nothing is recomputed per
// call.

//! Modules under construction and finalized programs.

use hashbrown::HashMap;

use super::builder::FunctionBuilder;
use super::error::{BuildError, BuildResult, ValidationError};
use super::function::{DefinedFunction, ExternalFunction, FuncId, Function, Signature};
use super::layout::{FrameLayout, Layout};
use super::types::{Type, TypeRegistry};
use super::validate;

/// Mutable collection of functions being built.
#[derive(Debug, Default)]
pub struct Module {
    functions: Vec<Function>,
    symbols: HashMap<String, FuncId>,
    types: TypeRegistry,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, function: Function) -> BuildResult<FuncId> {
        let name = function.name().to_string();
        if self.symbols.contains_key(&name) {
            return Err(BuildError::DuplicateSymbol { name });
        }
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        self.symbols.insert(name, id);
        Ok(id)
    }

    /// Declare a function whose body will be built with [`Module::builder`].
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        args: Vec<Type>,
        ret: Type,
    ) -> BuildResult<FuncId> {
        let signature = Signature::new(name, args, ret);
        self.insert(Function::Defined(DefinedFunction::new(signature)))
    }

    /// Declare a function whose body is supplied by the host under `symbol`.
    pub fn declare_external(
        &mut self,
        name: impl Into<String>,
        symbol: impl Into<String>,
        args: Vec<Type>,
        ret: Type,
    ) -> BuildResult<FuncId> {
        let signature = Signature::new(name, args, ret);
        self.insert(Function::External(ExternalFunction {
            signature,
            symbol: symbol.into(),
        }))
    }

    /// Start appending to the body of a defined function.
    pub fn builder(&mut self, id: FuncId) -> BuildResult<FunctionBuilder<'_>> {
        match self.functions.get(id.index()) {
            None => Err(BuildError::UnknownFunction { index: id.0 }),
            Some(Function::External(f)) => Err(BuildError::NotDefined {
                name: f.signature.name.clone(),
            }),
            Some(Function::Defined(_)) => Ok(FunctionBuilder::new(self, id)),
        }
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub(crate) fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<FuncId> {
        self.symbols.get(name).copied()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Validate every defined function and freeze the module.
    pub fn finalize(self) -> Result<Program, ValidationError> {
        for function in &self.functions {
            if let Function::Defined(func) = function {
                validate::validate_function(func)?;
            }
        }

        let mut layouts = Vec::with_capacity(self.functions.len());
        for function in &self.functions {
            let too_large = || ValidationError::FrameTooLarge {
                function: function.name().to_string(),
            };
            let frame = match function.as_defined() {
                Some(func) => Some(FrameLayout::for_function(func).ok_or_else(too_large)?),
                None => None,
            };
            let args = Layout::compute(&function.signature().args).ok_or_else(too_large)?;
            layouts.push(FunctionLayouts { frame, args });
        }

        log::info!(
            "finalized module: {} functions ({} defined)",
            self.functions.len(),
            self.functions.iter().filter(|f| f.is_defined()).count()
        );

        Ok(Program {
            functions: self.functions,
            symbols: self.symbols,
            layouts,
        })
    }
}

#[derive(Debug)]
struct FunctionLayouts {
    frame: Option<FrameLayout>,
    args: Layout,
}

/// A validated, immutable module ready for execution.
#[derive(Debug)]
pub struct Program {
    functions: Vec<Function>,
    symbols: HashMap<String, FuncId>,
    layouts: Vec<FunctionLayouts>,
}

impl Program {
    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<FuncId> {
        self.symbols.get(name).copied()
    }

    /// Frame layout of a defined function.
    pub fn frame_layout(&self, id: FuncId) -> Option<&FrameLayout> {
        self.layouts.get(id.index())?.frame.as_ref()
    }

    /// Layout of the argument block passed to a function.
    pub fn arg_layout(&self, id: FuncId) -> Option<&Layout> {
        self.layouts.get(id.index()).map(|l| &l.args)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
