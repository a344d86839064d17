// Static initializer ordering
//
//  Copyright (C) 2014-2022 Ryan Specialty Group, LLC.
//
//  This file is part of bootld.
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Selection and ordering of the static initializers run at boot.
//!
//! Only eager types that declare a static initializer are candidates;
//!   every other type is initialized lazily by the runtime on first use.
//! The image linker emits one call per candidate,
//!   in the order produced by an [`InitializerOrder`].

use crate::{
    boot::{BootClassSet, Descriptor, DescriptorKind},
    sym::SymbolId,
};
use fxhash::FxHashMap;
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::DfsPostOrder,
};
use std::fmt::{self, Display};

/// Policy deciding which static initializers run at boot,
///   and in what order.
pub trait InitializerOrder {
    /// Names of the types whose static initializers are to be called,
    ///   in call order.
    fn order(&self, set: &BootClassSet) -> Result<Vec<SymbolId>, InitOrderError>;
}

/// Whether `desc` is initialized at boot rather than lazily.
pub fn is_boot_initialized(desc: &Descriptor) -> bool {
    desc.kind() == DescriptorKind::Type && desc.is_eager() && desc.has_clinit()
}

/// Initializers in boot class set order.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclarationOrder;

impl InitializerOrder for DeclarationOrder {
    fn order(&self, set: &BootClassSet) -> Result<Vec<SymbolId>, InitOrderError> {
        Ok(set
            .iter()
            .filter(|desc| is_boot_initialized(desc))
            .map(Descriptor::name)
            .collect())
    }
}

/// Initializers ordered so that a type is initialized only after every
///   candidate type it references through a `ref` field.
///
/// Ties are broken by boot class set order,
///   so a set without references orders as [`DeclarationOrder`] would.
/// A reference from a type to itself is not a dependency;
///   any other cycle is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyOrder;

impl InitializerOrder for DependencyOrder {
    fn order(&self, set: &BootClassSet) -> Result<Vec<SymbolId>, InitOrderError> {
        let mut graph = DiGraph::<SymbolId, ()>::new();
        let mut nodes = FxHashMap::<SymbolId, NodeIndex>::default();

        let candidates: Vec<_> =
            set.iter().filter(|desc| is_boot_initialized(desc)).collect();

        for desc in &candidates {
            nodes.insert(desc.name(), graph.add_node(desc.name()));
        }

        for desc in &candidates {
            let from = nodes[&desc.name()];

            for dep in desc.refs().filter(|dep| *dep != desc.name()) {
                if let Some(&to) = nodes.get(&dep) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        check_cycles(&graph)?;

        // post-order yields each dependency before its dependents
        let mut order = Vec::with_capacity(candidates.len());
        let mut dfs = DfsPostOrder::empty(&graph);

        for desc in &candidates {
            dfs.move_to(nodes[&desc.name()]);

            while let Some(index) = dfs.next(&graph) {
                order.push(graph[index]);
            }
        }

        Ok(order)
    }
}

fn check_cycles(graph: &DiGraph<SymbolId, ()>) -> Result<(), InitOrderError> {
    let cycles: Vec<Vec<SymbolId>> = petgraph::algo::tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| scc.into_iter().map(|index| graph[index]).collect())
        .collect();

    if cycles.is_empty() {
        Ok(())
    } else {
        Err(InitOrderError::Cycles(cycles))
    }
}

/// Static initializers could not be ordered.
#[derive(Debug, PartialEq, Eq)]
pub enum InitOrderError {
    /// Types whose static initializers depend on one another,
    ///   one list per cycle.
    Cycles(Vec<Vec<SymbolId>>),
}

impl Display for InitOrderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cycles(cycles) => {
                write!(f, "static initializer dependency cycle(s): ")?;

                let mut sep = "";
                for cycle in cycles {
                    write!(f, "{sep}[")?;

                    let mut inner = "";
                    for name in cycle {
                        write!(f, "{inner}`{name}`")?;
                        inner = ", ";
                    }

                    write!(f, "]")?;
                    sep = "; ";
                }

                Ok(())
            }
        }
    }
}

impl std::error::Error for InitOrderError {}
