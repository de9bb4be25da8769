//! Constant pool collaborator: the symbol-resolution seam used by the method
//! writer, plus a deduplicating pool that implements it

use std::collections::HashMap;

use once_cell::unsync::OnceCell;

use super::descriptor::{argument_and_return_sizes, ArgSizes};
use super::error::{ConstPoolError, ConstPoolResult};
use crate::common::error::Result;

/// Pre-resolved field or method reference handed out by a [`SymbolResolver`]
#[derive(Debug, Clone)]
pub struct MemberRef {
    pub index: u16,
    pub descriptor: String,
    sizes: OnceCell<ArgSizes>,
}

impl MemberRef {
    pub fn new(index: u16, descriptor: impl Into<String>) -> Self {
        Self {
            index,
            descriptor: descriptor.into(),
            sizes: OnceCell::new(),
        }
    }

    /// Argument and return sizes of a method reference, parsed on first use
    pub fn arg_sizes(&self) -> Result<ArgSizes> {
        self.sizes
            .get_or_try_init(|| argument_and_return_sizes(&self.descriptor))
            .copied()
    }

    #[cfg(test)]
    fn has_cached_sizes(&self) -> bool {
        self.sizes.get().is_some()
    }
}

/// Values loadable with `ldc`, `ldc_w` or `ldc2_w`
#[derive(Debug, Clone, PartialEq)]
pub enum LdcConstant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Internal class name, e.g. `java/lang/Object`
    Class(String),
}

impl LdcConstant {
    /// Long and double occupy two stack words and two pool slots
    pub fn is_wide(&self) -> bool {
        matches!(self, LdcConstant::Long(_) | LdcConstant::Double(_))
    }
}

/// Pool slot of a loadable constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadableItem {
    pub index: u16,
    pub wide: bool,
}

/// Symbol table consulted by the method writer. Implementations own the
/// constant pool of the class being assembled.
pub trait SymbolResolver {
    fn utf8(&mut self, value: &str) -> ConstPoolResult<u16>;

    fn class(&mut self, internal_name: &str) -> ConstPoolResult<u16>;

    fn field(&mut self, owner: &str, name: &str, descriptor: &str) -> ConstPoolResult<&MemberRef>;

    fn method(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> ConstPoolResult<&MemberRef>;

    fn constant(&mut self, value: &LdcConstant) -> ConstPoolResult<LoadableItem>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
}

impl Constant {
    /// Slots taken in the pool
    pub fn slots(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    fn key(&self) -> ConstKey {
        match self {
            Constant::Utf8(s) => ConstKey::Utf8(s.clone()),
            Constant::Integer(v) => ConstKey::Integer(*v),
            Constant::Float(v) => ConstKey::Float(v.to_bits()),
            Constant::Long(v) => ConstKey::Long(*v),
            Constant::Double(v) => ConstKey::Double(v.to_bits()),
            Constant::Class(i) => ConstKey::Class(*i),
            Constant::String(i) => ConstKey::String(*i),
            Constant::FieldRef(a, b) => ConstKey::Ref(constant_tags::CONSTANT_FIELDREF, *a, *b),
            Constant::MethodRef(a, b) => ConstKey::Ref(constant_tags::CONSTANT_METHODREF, *a, *b),
            Constant::InterfaceMethodRef(a, b) => {
                ConstKey::Ref(constant_tags::CONSTANT_INTERFACEMETHODREF, *a, *b)
            }
            Constant::NameAndType(a, b) => ConstKey::Ref(constant_tags::CONSTANT_NAMEANDTYPE, *a, *b),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        use constant_tags::*;
        let mut bytes = Vec::new();
        match self {
            Constant::Utf8(value) => {
                bytes.push(CONSTANT_UTF8);
                let utf8_bytes = value.as_bytes();
                bytes.extend_from_slice(&(utf8_bytes.len() as u16).to_be_bytes());
                bytes.extend_from_slice(utf8_bytes);
            }
            Constant::Integer(value) => {
                bytes.push(CONSTANT_INTEGER);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Float(value) => {
                bytes.push(CONSTANT_FLOAT);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Long(value) => {
                bytes.push(CONSTANT_LONG);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Double(value) => {
                bytes.push(CONSTANT_DOUBLE);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Class(index) | Constant::String(index) => {
                bytes.push(if matches!(self, Constant::Class(_)) { CONSTANT_CLASS } else { CONSTANT_STRING });
                bytes.extend_from_slice(&index.to_be_bytes());
            }
            Constant::FieldRef(a, b)
            | Constant::MethodRef(a, b)
            | Constant::InterfaceMethodRef(a, b)
            | Constant::NameAndType(a, b) => {
                let tag = match self {
                    Constant::FieldRef(..) => CONSTANT_FIELDREF,
                    Constant::MethodRef(..) => CONSTANT_METHODREF,
                    Constant::InterfaceMethodRef(..) => CONSTANT_INTERFACEMETHODREF,
                    _ => CONSTANT_NAMEANDTYPE,
                };
                bytes.push(tag);
                bytes.extend_from_slice(&a.to_be_bytes());
                bytes.extend_from_slice(&b.to_be_bytes());
            }
        }
        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Ref(u8, u16, u16),
}

/// Deduplicating constant pool. Indices are 1-based and long/double entries
/// take two slots, as in a class file.
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<(u16, Constant)>,
    next_slot: u16,
    lookup: HashMap<ConstKey, u16>,
    members: HashMap<u16, MemberRef>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            next_slot: 1,
            ..Default::default()
        }
    }

    /// `constant_pool_count` as written to the class file
    pub fn count(&self) -> u16 {
        self.next_slot.max(1)
    }

    pub fn get(&self, index: u16) -> ConstPoolResult<&Constant> {
        self.entries
            .binary_search_by_key(&index, |(slot, _)| *slot)
            .map(|i| &self.entries[i].1)
            .map_err(|_| ConstPoolError::InvalidIndex(index))
    }

    fn add(&mut self, constant: Constant) -> ConstPoolResult<u16> {
        let key = constant.key();
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }
        let index = self.next_slot.max(1);
        let next = index
            .checked_add(constant.slots())
            .ok_or(ConstPoolError::OutOfSpace)?;
        self.next_slot = next;
        self.entries.push((index, constant));
        self.lookup.insert(key, index);
        Ok(index)
    }

    pub fn add_utf8(&mut self, value: &str) -> ConstPoolResult<u16> {
        if value.len() > u16::MAX as usize {
            return Err(ConstPoolError::Utf8TooLong { len: value.len() });
        }
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn add_class(&mut self, name: &str) -> ConstPoolResult<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    pub fn add_string(&mut self, value: &str) -> ConstPoolResult<u16> {
        let utf8_index = self.add_utf8(value)?;
        self.add(Constant::String(utf8_index))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> ConstPoolResult<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType(name_index, descriptor_index))
    }

    fn add_member(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        make: fn(u16, u16) -> Constant,
    ) -> ConstPoolResult<&MemberRef> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        let index = self.add(make(class_index, name_and_type_index))?;
        let member = self
            .members
            .entry(index)
            .or_insert_with(|| MemberRef::new(index, descriptor));
        Ok(&*member)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.count().to_be_bytes());
        for (_, constant) in &self.entries {
            bytes.extend_from_slice(&constant.to_bytes());
        }
        bytes
    }
}

impl SymbolResolver for ConstantPool {
    fn utf8(&mut self, value: &str) -> ConstPoolResult<u16> {
        self.add_utf8(value)
    }

    fn class(&mut self, internal_name: &str) -> ConstPoolResult<u16> {
        self.add_class(internal_name)
    }

    fn field(&mut self, owner: &str, name: &str, descriptor: &str) -> ConstPoolResult<&MemberRef> {
        self.add_member(owner, name, descriptor, Constant::FieldRef)
    }

    fn method(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> ConstPoolResult<&MemberRef> {
        if interface {
            self.add_member(owner, name, descriptor, Constant::InterfaceMethodRef)
        } else {
            self.add_member(owner, name, descriptor, Constant::MethodRef)
        }
    }

    fn constant(&mut self, value: &LdcConstant) -> ConstPoolResult<LoadableItem> {
        let index = match value {
            LdcConstant::Int(v) => self.add(Constant::Integer(*v))?,
            LdcConstant::Float(v) => self.add(Constant::Float(*v))?,
            LdcConstant::Long(v) => self.add(Constant::Long(*v))?,
            LdcConstant::Double(v) => self.add(Constant::Double(*v))?,
            LdcConstant::String(s) => self.add_string(s)?,
            LdcConstant::Class(name) => self.add_class(name)?,
        };
        Ok(LoadableItem { index, wide: value.is_wide() })
    }
}
