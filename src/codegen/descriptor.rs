//! Slot sizes of field and method descriptors

use crate::common::error::{Error, Result};

/// Argument and return slot sizes of a method descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSizes {
    /// Argument slots including one for the receiver
    pub args: u16,
    /// Return slots: 0 for `V`, 2 for `J`/`D`, 1 otherwise
    pub ret: u8,
}

impl ArgSizes {
    /// Stack effect of invoking a method with these sizes
    pub fn invoke_effect(self, is_static: bool) -> i32 {
        let receiver = if is_static { 1 } else { 0 };
        self.ret as i32 - self.args as i32 + receiver
    }

    /// Instance methods count the receiver against the 255 slot limit
    pub fn check_instance(self, descriptor: &str) -> Result<Self> {
        if self.args > 255 {
            return Err(Error::invalid_descriptor(descriptor));
        }
        Ok(self)
    }
}

/// Parse one field type starting at `pos`; returns its slot size and the
/// position just past it
fn parse_field_type(desc: &[u8], pos: usize, full: &str) -> Result<(u8, usize)> {
    let mut i = pos;
    let mut dims = 0;
    while desc.get(i) == Some(&b'[') {
        dims += 1;
        i += 1;
    }
    if dims > 255 {
        return Err(Error::invalid_descriptor(full));
    }
    let size = match desc.get(i) {
        Some(b'J') | Some(b'D') => 2,
        Some(b'B' | b'C' | b'F' | b'I' | b'S' | b'Z') => 1,
        Some(b'L') => {
            let end = desc[i..]
                .iter()
                .position(|&b| b == b';')
                .ok_or_else(|| Error::invalid_descriptor(full))?;
            // `L;` names no class
            if end == 1 {
                return Err(Error::invalid_descriptor(full));
            }
            i += end;
            1
        }
        _ => return Err(Error::invalid_descriptor(full)),
    };
    let size = if dims > 0 { 1 } else { size };
    Ok((size, i + 1))
}

/// Slot size of a field descriptor such as `J` or `[Ljava/lang/String;`
pub fn field_size(descriptor: &str) -> Result<u8> {
    let bytes = descriptor.as_bytes();
    let (size, end) = parse_field_type(bytes, 0, descriptor)?;
    if end != bytes.len() {
        return Err(Error::invalid_descriptor(descriptor));
    }
    Ok(size)
}

/// Argument and return sizes of a method descriptor such as `(IJ)V`
pub fn argument_and_return_sizes(descriptor: &str) -> Result<ArgSizes> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(Error::invalid_descriptor(descriptor));
    }
    let mut args: u32 = 1;
    let mut pos = 1;
    loop {
        match bytes.get(pos) {
            Some(b')') => break,
            Some(_) => {
                let (size, next) = parse_field_type(bytes, pos, descriptor)?;
                args += size as u32;
                pos = next;
            }
            None => return Err(Error::invalid_descriptor(descriptor)),
        }
    }
    pos += 1;
    let ret = if bytes.get(pos) == Some(&b'V') && pos + 1 == bytes.len() {
        0
    } else {
        let (size, end) = parse_field_type(bytes, pos, descriptor)?;
        if end != bytes.len() {
            return Err(Error::invalid_descriptor(descriptor));
        }
        size
    };
    // 255 parameter slots; the receiver is checked by callers that know
    // the method is not static
    if args - 1 > 255 {
        return Err(Error::invalid_descriptor(descriptor));
    }
    Ok(ArgSizes { args: args as u16, ret })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_sizes() {
        assert_eq!(argument_and_return_sizes("()V").unwrap(), ArgSizes { args: 1, ret: 0 });
        assert_eq!(argument_and_return_sizes("(IJ)D").unwrap(), ArgSizes { args: 4, ret: 2 });
        assert_eq!(
            argument_and_return_sizes("([JLjava/lang/String;D)Ljava/lang/Object;").unwrap(),
            ArgSizes { args: 5, ret: 1 }
        );
        assert_eq!(argument_and_return_sizes("([[D)[J").unwrap(), ArgSizes { args: 2, ret: 1 });
    }

    #[test]
    fn test_invoke_effect() {
        let sizes = argument_and_return_sizes("(IJ)D").unwrap();
        assert_eq!(sizes.invoke_effect(true), -1);
        assert_eq!(sizes.invoke_effect(false), -2);
    }

    #[test]
    fn test_parameter_slot_limit() {
        let ints = |n: usize| format!("({})V", "I".repeat(n));
        let full = argument_and_return_sizes(&ints(255)).unwrap();
        assert_eq!(full.args, 256);
        assert!(full.check_instance(&ints(255)).is_err());
        assert!(argument_and_return_sizes(&ints(254)).unwrap().check_instance(&ints(254)).is_ok());
        assert!(argument_and_return_sizes(&ints(256)).is_err());
        assert!(argument_and_return_sizes(&format!("({}J)V", "I".repeat(254))).is_err());
    }

    #[test]
    fn test_field_sizes() {
        assert_eq!(field_size("I").unwrap(), 1);
        assert_eq!(field_size("D").unwrap(), 2);
        assert_eq!(field_size("[D").unwrap(), 1);
        assert_eq!(field_size("Ljava/util/List;").unwrap(), 1);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "V", "(I", "(I)", "(Q)V", "(Ljava/lang/String)V", "()VV", "(L;)V"] {
            assert!(argument_and_return_sizes(bad).is_err(), "accepted {bad:?}");
        }
        assert!(field_size("V").is_err());
        assert!(field_size("II").is_err());
    }
}
