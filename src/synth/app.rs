use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::construct::tree::{ConstructKind, NodeId, Tree};
use crate::errors::{Result, SynthError};
use crate::stack::cross_stack::prescan_stack;
use crate::stack::{ensure_backend_exists, stack_data, stack_data_mut, stack_to_terraform, StackPhase};
use crate::synth::manifest::build_manifest;
use crate::synth::validation::collect_messages;
use crate::tokens::resolver::Resolver;
use crate::tokens::table::TokenTable;

/// The application root: owns the construct tree, the token table, and the
/// synthesis pipeline. Two apps in one process are fully independent.
pub struct App {
    tree: Tree,
    tokens: TokenTable,
    root: NodeId,
    outdir: PathBuf,
    synthesized: bool,
}

impl App {
    pub fn new(outdir: impl Into<PathBuf>) -> App {
        let (tree, root) = Tree::new();
        App {
            tree,
            tokens: TokenTable::new(),
            root,
            outdir: outdir.into(),
            synthesized: false,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenTable {
        &mut self.tokens
    }

    /// Stacks directly under the root, in construct-insertion order.
    pub fn stacks(&self) -> Vec<NodeId> {
        self.tree
            .children(self.root)
            .iter()
            .copied()
            .filter(|node| matches!(self.tree.kind(*node), ConstructKind::Stack(_)))
            .collect()
    }

    /// Resolve all token handles in `value` as if it belonged to `stack`.
    pub fn resolve_value(&mut self, stack: impl Into<NodeId>, value: &Value) -> Result<Value> {
        let stack = stack.into();
        let mut resolver = Resolver::new(&mut self.tree, &self.tokens, stack);
        resolver.resolve(value)
    }

    /// Run the full pipeline: prepare, validate, synthesize each stack to
    /// `<outdir>/stacks/<name>/cdk.tf.json`, and write the manifest.
    pub fn synth(&mut self) -> Result<()> {
        if self.synthesized {
            return Err(SynthError::ValidationFailed {
                messages: vec!["synth() already ran for this app; stacks only move forward through their lifecycle".to_string()],
            });
        }

        self.prepare()?;
        self.validate()?;

        let order = self.topo_order();
        for stack in &order {
            self.write_stack(*stack)?;
        }

        let manifest = build_manifest(&self.tree, &self.stacks());
        let manifest_path = self.outdir.join("manifest.json");
        let text = serde_json::to_string_pretty(&manifest).expect("manifest serializes");
        fs::create_dir_all(&self.outdir).map_err(|e| SynthError::Io {
            path: self.outdir.clone(),
            source: e,
        })?;
        fs::write(&manifest_path, text + "\n").map_err(|e| SynthError::Io {
            path: manifest_path.clone(),
            source: e,
        })?;
        tracing::info!(stacks = order.len(), outdir = %self.outdir.display(), "synthesis complete");

        self.synthesized = true;
        Ok(())
    }

    /// Prepare phase: ancestor-first aspect visits over a snapshot of the
    /// tree, then per stack a guaranteed backend and the cross-stack
    /// reference pre-scan.
    fn prepare(&mut self) -> Result<()> {
        let snapshot = self.tree.find_all(self.root);
        for node in snapshot {
            for aspect in self.tree.applicable_aspects(node) {
                aspect.visit(&mut self.tree, node);
            }
        }

        for stack in self.stacks() {
            ensure_backend_exists(&mut self.tree, stack)?;
            prescan_stack(&mut self.tree, &self.tokens, stack)?;
            stack_data_mut(&mut self.tree, stack).phase = StackPhase::Prepared;
            tracing::debug!(stack = %stack_data(&self.tree, stack).name, "stack prepared");
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let stacks = self.stacks();
        let messages = collect_messages(&self.tree, self.root, &stacks);
        if !messages.is_empty() {
            return Err(SynthError::ValidationFailed { messages });
        }
        for stack in stacks {
            stack_data_mut(&mut self.tree, stack).phase = StackPhase::Validated;
        }
        Ok(())
    }

    /// Topological order of the stack dependency graph via Kahn's algorithm;
    /// among equal ranks, construct-insertion order breaks ties.
    fn topo_order(&self) -> Vec<NodeId> {
        let stacks = self.stacks();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for stack in &stacks {
            let deps = &stack_data(&self.tree, *stack).dependencies;
            in_degree.insert(*stack, deps.len());
            for dep in deps {
                dependents.entry(*dep).or_default().push(*stack);
            }
        }

        let mut queue: VecDeque<NodeId> = stacks
            .iter()
            .copied()
            .filter(|stack| in_degree[stack] == 0)
            .collect();
        let mut order = Vec::with_capacity(stacks.len());
        while let Some(stack) = queue.pop_front() {
            order.push(stack);
            for dependent in dependents.get(&stack).cloned().unwrap_or_default() {
                let degree = in_degree.entry(dependent).or_insert(0);
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        order
    }

    fn write_stack(&mut self, stack: NodeId) -> Result<()> {
        let name = stack_data(&self.tree, stack).name.clone();
        let doc = stack_to_terraform(&mut self.tree, &self.tokens, stack)?;

        let stack_dir = self.outdir.join("stacks").join(&name);
        fs::create_dir_all(&stack_dir).map_err(|e| SynthError::Io {
            path: stack_dir.clone(),
            source: e,
        })?;
        let json_path = stack_dir.join("cdk.tf.json");
        let text = serde_json::to_string_pretty(&doc).expect("stack document serializes");
        fs::write(&json_path, text + "\n").map_err(|e| SynthError::Io {
            path: json_path.clone(),
            source: e,
        })?;

        stack_data_mut(&mut self.tree, stack).phase = StackPhase::Written;
        tracing::info!(stack = %name, path = %json_path.display(), "stack written");
        Ok(())
    }
}
