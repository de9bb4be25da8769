//! Side tables of a method body and the `Code` attribute built from them

use super::constpool::SymbolResolver;
use super::label::{Label, Labels};
use super::resize::ResizeEntry;
use crate::common::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Class index of the caught type, 0 for any
    pub catch_type: u16,
}

impl ExceptionTableEntry {
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..2].copy_from_slice(&self.start_pc.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.end_pc.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.handler_pc.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.catch_type.to_be_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

/// Row of a LocalVariableTable or LocalVariableTypeTable. For the type
/// table `descriptor_index` names the generic signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVarEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// Attribute with an already-encoded body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(6 + self.info.len());
        bytes.extend_from_slice(&self.name_index.to_be_bytes());
        bytes.extend_from_slice(&(self.info.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.info);
        bytes
    }
}

/// Offset as stored in a class file table
pub(crate) fn pc_u16(pc: usize) -> Result<u16> {
    u16::try_from(pc).map_err(|_| Error::CodeTooLarge { length: pc })
}

/// Finished method body
#[derive(Debug)]
pub struct MethodCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_numbers: Vec<LineNumberEntry>,
    pub local_variables: Vec<LocalVarEntry>,
    pub local_variable_types: Vec<LocalVarEntry>,
    /// Growth applied by the resizer, empty when nothing had to move
    pub resizes: Vec<ResizeEntry>,
    /// Resizer passes, 0 when it did not run
    pub resize_passes: usize,
    pub(crate) labels: Labels,
}

impl MethodCode {
    /// Final offset of a label of this method
    pub fn label_offset(&self, label: Label) -> Option<u32> {
        self.labels
            .position(label)
            .ok()
            .flatten()
            .map(|pos| pos as u32)
    }

    /// Complete `Code` attribute, name index and length included
    pub fn to_code_attribute<R: SymbolResolver + ?Sized>(&self, symbols: &mut R) -> Result<Vec<u8>> {
        if self.code.len() > u16::MAX as usize {
            return Err(Error::CodeTooLarge { length: self.code.len() });
        }

        let mut attributes = Vec::new();
        if !self.line_numbers.is_empty() {
            let mut info = Vec::with_capacity(2 + 4 * self.line_numbers.len());
            info.extend_from_slice(&(self.line_numbers.len() as u16).to_be_bytes());
            for entry in &self.line_numbers {
                info.extend_from_slice(&entry.start_pc.to_be_bytes());
                info.extend_from_slice(&entry.line_number.to_be_bytes());
            }
            attributes.push(AttributeInfo::new(symbols.utf8("LineNumberTable")?, info));
        }
        for (name, table) in [
            ("LocalVariableTable", &self.local_variables),
            ("LocalVariableTypeTable", &self.local_variable_types),
        ] {
            if table.is_empty() {
                continue;
            }
            let mut info = Vec::with_capacity(2 + 10 * table.len());
            info.extend_from_slice(&(table.len() as u16).to_be_bytes());
            for entry in table {
                for value in [entry.start_pc, entry.length, entry.name_index, entry.descriptor_index, entry.index] {
                    info.extend_from_slice(&value.to_be_bytes());
                }
            }
            attributes.push(AttributeInfo::new(symbols.utf8(name)?, info));
        }

        let mut body = Vec::new();
        body.extend_from_slice(&self.max_stack.to_be_bytes());
        body.extend_from_slice(&self.max_locals.to_be_bytes());
        body.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.code);
        body.extend_from_slice(&(self.exception_table.len() as u16).to_be_bytes());
        for entry in &self.exception_table {
            body.extend_from_slice(&entry.to_bytes());
        }
        body.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in &attributes {
            body.extend_from_slice(&attribute.to_bytes());
        }

        Ok(AttributeInfo::new(symbols.utf8("Code")?, body).to_bytes())
    }
}
