//! Optimizer hint metadata: the type-based alias-analysis tree and the
//! per-module alias-scope domain.
//!
//! All node ids come from one dense counter on the generation state, so the
//! rendered file has a single `!N` namespace. Nodes are memoized by
//! structural identity: asking for the same logical node twice returns the
//! same id and never re-emits a metadata line. The no-alias set is the one
//! deliberate exception — it is recomputed (and re-emitted) on demand.

use std::collections::{BTreeMap, HashMap};

use super::GenState;

#[derive(Debug, Default)]
pub struct TbaaState {
    /// Structural description -> assigned id, covering every node kind.
    nodes: HashMap<String, u32>,
    pub(crate) lines: Vec<String>,
    root: Option<u32>,
    scalar_ids: HashMap<String, u32>,
    struct_ids: HashMap<String, u32>,
    access_tags: HashMap<String, u32>,
}

#[derive(Debug, Default)]
pub struct AliasScopeState {
    domain: Option<u32>,
    scope_ids: BTreeMap<String, u32>,
    pub(crate) lines: Vec<String>,
}

impl GenState<'_> {
    fn alloc_md(&mut self) -> u32 {
        let id = self.md_next;
        self.md_next += 1;
        id
    }

    /// The single root anchor, created on first use.
    pub fn tbaa_root(&mut self) -> u32 {
        if let Some(root) = self.tbaa.root {
            return root;
        }
        let id = self.alloc_md();
        self.tbaa.lines.push(format!("!{} = !{{!\"mml tbaa root\"}}", id));
        self.tbaa.root = Some(id);
        id
    }

    /// A scalar node parented to the root, memoized by name.
    pub fn tbaa_scalar(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.tbaa.scalar_ids.get(name) {
            return id;
        }
        let root = self.tbaa_root();
        let key = format!("scalar:{}", name);
        if let Some(&id) = self.tbaa.nodes.get(&key) {
            self.tbaa.scalar_ids.insert(name.to_string(), id);
            return id;
        }
        let id = self.alloc_md();
        self.tbaa
            .lines
            .push(format!("!{} = !{{!\"{}\", !{}, i64 0}}", id, name, root));
        self.tbaa.nodes.insert(key, id);
        self.tbaa.scalar_ids.insert(name.to_string(), id);
        id
    }

    /// A struct node listing `(field node, byte offset)` pairs. Field scalar
    /// nodes are created first; the struct node itself is memoized by its
    /// structural description.
    pub fn tbaa_struct(&mut self, name: &str, fields: &[(String, u64)]) -> u32 {
        if let Some(&id) = self.tbaa.struct_ids.get(name) {
            return id;
        }
        let mut parts = Vec::with_capacity(fields.len());
        for (field_ty, offset) in fields {
            let field_id = self.tbaa_scalar(field_ty);
            parts.push(format!("!{}, i64 {}", field_id, offset));
        }
        let key = format!(
            "struct:{}:{}",
            name,
            fields
                .iter()
                .map(|(t, o)| format!("{}@{}", t, o))
                .collect::<Vec<_>>()
                .join(",")
        );
        if let Some(&id) = self.tbaa.nodes.get(&key) {
            self.tbaa.struct_ids.insert(name.to_string(), id);
            return id;
        }
        let id = self.alloc_md();
        self.tbaa.lines.push(format!(
            "!{} = !{{!\"{}\", {}}}",
            id,
            name,
            parts.join(", ")
        ));
        self.tbaa.nodes.insert(key, id);
        self.tbaa.struct_ids.insert(name.to_string(), id);
        id
    }

    /// The 3-element access tag attached to loads/stores of a scalar type,
    /// memoized so repeated accesses never duplicate metadata lines.
    pub fn tbaa_access_tag(&mut self, type_name: &str) -> u32 {
        let key = format!("access:{}", type_name);
        if let Some(&id) = self.tbaa.access_tags.get(&key) {
            return id;
        }
        let node = self.tbaa_scalar(type_name);
        let id = self.alloc_md();
        self.tbaa
            .lines
            .push(format!("!{} = !{{!{}, !{}, i64 0}}", id, node, node));
        self.tbaa.access_tags.insert(key, id);
        id
    }

    /// Access tag for a field load through a struct, memoized by the
    /// composite `struct#index` key.
    pub fn tbaa_field_access_tag(
        &mut self,
        struct_name: &str,
        fields: &[(String, u64)],
        field_index: usize,
    ) -> u32 {
        let key = format!("access:{}#{}", struct_name, field_index);
        if let Some(&id) = self.tbaa.access_tags.get(&key) {
            return id;
        }
        let struct_node = self.tbaa_struct(struct_name, fields);
        let (field_ty, offset) = &fields[field_index];
        let field_node = self.tbaa_scalar(field_ty);
        let id = self.alloc_md();
        self.tbaa.lines.push(format!(
            "!{} = !{{!{}, !{}, i64 {}}}",
            id, struct_node, field_node, offset
        ));
        self.tbaa.access_tags.insert(key, id);
        id
    }

    /// One distinct alias domain per module, created on first use.
    pub fn alias_domain(&mut self) -> u32 {
        if let Some(domain) = self.alias.domain {
            return domain;
        }
        let id = self.alloc_md();
        self.alias.lines.push(format!(
            "!{} = distinct !{{!{}, !\"{} alias domain\"}}",
            id, id, self.module_name
        ));
        self.alias.domain = Some(id);
        id
    }

    /// A per-type scope nested under the module domain, memoized by name.
    pub fn alias_scope(&mut self, type_name: &str) -> u32 {
        if let Some(&id) = self.alias.scope_ids.get(type_name) {
            return id;
        }
        let domain = self.alias_domain();
        let id = self.alloc_md();
        self.alias.lines.push(format!(
            "!{} = distinct !{{!{}, !{}, !\"{}\"}}",
            id, id, domain, type_name
        ));
        self.alias.scope_ids.insert(type_name.to_string(), id);
        id
    }

    /// The no-alias set for a type: every *other* registered scope, ordered
    /// by numeric id. Computed on demand and emitted fresh each time; `None`
    /// when no other scope exists.
    pub fn noalias_set(&mut self, type_name: &str) -> Option<u32> {
        let own = self.alias.scope_ids.get(type_name).copied();
        let mut others: Vec<u32> = self
            .alias
            .scope_ids
            .values()
            .copied()
            .filter(|id| Some(*id) != own)
            .collect();
        if others.is_empty() {
            return None;
        }
        others.sort_unstable();
        let id = self.alloc_md();
        let list = others
            .iter()
            .map(|s| format!("!{}", s))
            .collect::<Vec<_>>()
            .join(", ");
        self.alias.lines.push(format!("!{} = !{{{}}}", id, list));
        Some(id)
    }
}
