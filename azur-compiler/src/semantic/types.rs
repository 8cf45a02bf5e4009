// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Type table used by the semantic analyzer.
//!
//! Types live in an arena and are addressed by [`TypeId`].
//! The first ids are fixed: the basic types `Any`, `Uint64`
//! and `Bytes`, the meta-type `Type` of type-name constants,
//! and `Void` for calls that produce nothing.

use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub ty: TypeId,
    /// The binding itself cannot be reassigned.
    pub const_reference: bool,
    /// Nothing reached through the binding can be written.
    pub const_members: bool,
}

impl Field {
    pub fn var(ty: TypeId) -> Self {
        Self {
            ty,
            const_reference: false,
            const_members: false,
        }
    }

    pub fn constant(ty: TypeId) -> Self {
        Self {
            ty,
            const_reference: true,
            const_members: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Accessor {
    pub index: TypeId,
    pub element: Field,
}

#[derive(Clone, Debug, Default)]
pub struct StructDef {
    pub parent: Option<TypeId>,
    pub fields: BTreeMap<String, Field>,
    pub accessor: Option<Accessor>,
}

#[derive(Clone, Debug)]
pub enum TypeKind {
    Basic,
    Meta,
    Struct(StructDef),
    Enum(Vec<&'static str>),
}

#[derive(Clone, Debug)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
}

#[derive(Clone, Debug)]
pub struct TypeTable {
    defs: Vec<TypeDef>,
    by_name: BTreeMap<String, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub const ANY: TypeId = TypeId(0);
    pub const UINT64: TypeId = TypeId(1);
    pub const BYTES: TypeId = TypeId(2);
    pub const TYPE: TypeId = TypeId(3);
    pub const VOID: TypeId = TypeId(4);

    pub fn new() -> Self {
        let mut t = Self {
            defs: Vec::new(),
            by_name: BTreeMap::new(),
        };

        t.insert("Any", TypeKind::Basic);
        t.insert("Uint64", TypeKind::Basic);
        t.insert("Bytes", TypeKind::Basic);
        t.insert("Type", TypeKind::Meta);
        t.insert("Void", TypeKind::Meta);

        t
    }

    fn insert(&mut self, name: &str, kind: TypeKind) -> TypeId {
        let id = TypeId(self.defs.len() as u32);
        self.defs.push(TypeDef {
            name: name.to_string(),
            kind,
        });
        self.by_name.insert(name.to_string(), id);

        id
    }

    pub fn add_struct(
        &mut self,
        name: &str,
        parent: Option<TypeId>,
        fields: &[(&str, Field)],
    ) -> TypeId {
        let def = StructDef {
            parent,
            fields: fields
                .iter()
                .map(|(n, f)| (n.to_string(), *f))
                .collect(),
            accessor: None,
        };

        self.insert(name, TypeKind::Struct(def))
    }

    pub fn add_enum(&mut self, name: &str, values: &[&'static str]) -> TypeId {
        self.insert(name, TypeKind::Enum(values.to_vec()))
    }

    /// `Elem[]` indexed by `index`, with a constant `len`.
    /// Arrays are interned by name.
    pub fn array_of(&mut self, elem: TypeId, index: TypeId) -> TypeId {
        let name = format!("{}[]", self.name(elem));
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }

        let id = self.add_struct(&name, None, &[("len", Field::constant(Self::UINT64))]);
        self.set_accessor(id, index, Field::var(elem));

        id
    }

    pub fn set_accessor(&mut self, ty: TypeId, index: TypeId, element: Field) {
        if let TypeKind::Struct(s) = &mut self.defs[ty.0 as usize].kind {
            s.accessor = Some(Accessor { index, element });
        }
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.defs[id.0 as usize]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.get(id).name
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Names usable as type constants in source code.
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.defs
            .iter()
            .filter(|d| !d.name.ends_with("[]") && !matches!(d.kind, TypeKind::Meta))
            .map(|d| d.name.as_str())
    }

    /// Own fields first, then the parent chain.
    pub fn member(&self, ty: TypeId, name: &str) -> Option<Field> {
        let mut cur = Some(ty);
        while let Some(id) = cur {
            let TypeKind::Struct(s) = &self.get(id).kind else {
                return None;
            };

            if let Some(f) = s.fields.get(name) {
                return Some(*f);
            }

            cur = s.parent;
        }

        None
    }

    pub fn accessor(&self, ty: TypeId) -> Option<&Accessor> {
        match &self.get(ty).kind {
            TypeKind::Struct(s) => s.accessor.as_ref(),
            _ => None,
        }
    }

    pub fn enum_values(&self, ty: TypeId) -> Option<&[&'static str]> {
        match &self.get(ty).kind {
            TypeKind::Enum(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_basic(&self, ty: TypeId) -> bool {
        matches!(ty, Self::ANY | Self::UINT64 | Self::BYTES)
    }

    pub fn is_enum(&self, ty: TypeId) -> bool {
        matches!(self.get(ty).kind, TypeKind::Enum(_))
    }

    /// Types that fit in a single stack slot.
    pub fn is_value(&self, ty: TypeId) -> bool {
        self.is_basic(ty) || self.is_enum(ty)
    }

    pub fn is_uint64_like(&self, ty: TypeId) -> bool {
        ty == Self::UINT64 || ty == Self::ANY
    }

    /// Equal types, or `Any` against any value type.
    pub fn is_compatible(&self, a: TypeId, b: TypeId) -> bool {
        if a == Self::ANY {
            return self.is_value(b);
        }

        if b == Self::ANY {
            return self.is_value(a);
        }

        a == b
    }

    pub fn is_assignable_from(&self, target: TypeId, source: TypeId) -> bool {
        if target == Self::ANY {
            return true;
        }

        let mut cur = Some(source);
        while let Some(id) = cur {
            if id == target {
                return true;
            }

            cur = match &self.get(id).kind {
                TypeKind::Struct(s) => s.parent,
                _ => None,
            };
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_lookup_falls_back_to_parent() {
        let mut t = TypeTable::new();
        let base = t.add_struct("Base", None, &[("Fee", Field::var(TypeTable::UINT64))]);
        let child = t.add_struct(
            "Child",
            Some(base),
            &[("Amount", Field::var(TypeTable::UINT64))],
        );

        assert!(t.member(child, "Amount").is_some());
        assert_eq!(t.member(child, "Fee").map(|f| f.ty), Some(TypeTable::UINT64));
        assert!(t.member(base, "Amount").is_none());
        assert!(t.is_assignable_from(base, child));
        assert!(!t.is_assignable_from(child, base));
    }

    #[test]
    fn arrays_are_interned_with_constant_len() {
        let mut t = TypeTable::new();
        let a = t.array_of(TypeTable::BYTES, TypeTable::UINT64);
        let b = t.array_of(TypeTable::BYTES, TypeTable::UINT64);

        assert_eq!(a, b);
        assert_eq!(t.name(a), "Bytes[]");
        assert!(t.member(a, "len").is_some_and(|f| f.const_reference));
        assert_eq!(t.accessor(a).map(|x| x.element.ty), Some(TypeTable::BYTES));
    }

    #[test]
    fn any_is_compatible_with_values_only() {
        let mut t = TypeTable::new();
        let e = t.add_enum("Color", &["Red"]);
        let s = t.add_struct("S", None, &[]);

        assert!(t.is_compatible(TypeTable::ANY, TypeTable::BYTES));
        assert!(t.is_compatible(e, TypeTable::ANY));
        assert!(!t.is_compatible(TypeTable::ANY, s));
        assert!(!t.is_compatible(TypeTable::UINT64, TypeTable::BYTES));
    }
}
