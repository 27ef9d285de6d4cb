//! Script opcodes and the execution machine.
//!
//! # Examples
//!
//! Evaluate a script that adds two numbers:
//!
//! ```rust
//! use scriptvm::script::op_codes::*;
//! use scriptvm::script::{Script, TransactionlessEnv, VERIFY_NONE};
//!
//! let mut script = Script::new();
//! script.append(OP_10);
//! script.append(OP_5);
//! script.append(OP_ADD);
//!
//! let env = TransactionlessEnv::new(VERIFY_NONE);
//! script.eval(&env).unwrap();
//! ```

use crate::script::op_codes::*;
use crate::util::{Error, Result};
use std::fmt;

mod condition;
mod env;
mod error;
mod machine;
mod num;
#[allow(dead_code)]
pub mod op_codes;
mod stack;

pub use self::condition::ConditionNest;
pub use self::env::{
    ENABLE_MONOLITH_OPCODES, LOCKTIME_THRESHOLD, MachineEnv, TransactionEnv, TransactionlessEnv,
    VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_CHECKSEQUENCEVERIFY, VERIFY_DISCOURAGE_UPGRADABLE_NOPS,
    VERIFY_MINIMALDATA, VERIFY_MINIMALIF, VERIFY_NONE,
};
pub use self::error::ScriptError;
pub use self::machine::Machine;
pub use self::num::{MAXIMUM_ELEMENT_SIZE, ScriptNum};
pub use self::stack::{Stack, StackItem, cast_to_bool};

/// Maximum number of bytes pushable to the stack
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum number of multisig keys
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Maximum number of non-push operations per script
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum script length in bytes
pub const MAX_SCRIPT_SIZE: usize = 520_000;

/// Maximum combined depth of the main and alt stacks
pub const MAX_STACK_SIZE: usize = 1000;

/// Transaction script
#[derive(Default, Clone, PartialEq, Eq, Hash)]
pub struct Script(pub Vec<u8>);

impl Script {
    /// Creates a new empty script
    #[must_use]
    pub fn new() -> Script {
        Script(vec![])
    }

    /// Appends a single opcode or data byte
    pub fn append(&mut self, byte: u8) {
        self.0.push(byte);
    }

    /// Appends a slice of data
    pub fn append_slice(&mut self, slice: &[u8]) {
        self.0.extend_from_slice(slice);
    }

    /// Appends the opcodes and provided data that push it onto the stack
    ///
    /// # Errors
    /// `Error::BadArgument` if the data cannot be represented by a
    /// single push.
    pub fn append_data(&mut self, data: &[u8]) -> Result<()> {
        match data.len() {
            0 => self.0.push(OP_0),
            1..=75 => {
                self.0.push(OP_PUSH + data.len() as u8);
                self.0.extend_from_slice(data);
            }
            76..=255 => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(data.len() as u8);
                self.0.extend_from_slice(data);
            }
            256..=65535 => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(data.len() as u16).to_le_bytes());
                self.0.extend_from_slice(data);
            }
            len => {
                if len > u32::MAX as usize {
                    return Err(Error::BadArgument(format!("Data too long: {}", len)));
                }
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(len as u32).to_le_bytes());
                self.0.extend_from_slice(data);
            }
        }
        Ok(())
    }

    /// Appends the opcodes to push a number to the stack
    ///
    /// # Errors
    /// `Error::BadArgument` when the number does not fit the four-byte
    /// operand range.
    pub fn append_num(&mut self, n: i64) -> Result<()> {
        let bytes = ScriptNum::new(n).to_bytes();
        if bytes.len() > MAXIMUM_ELEMENT_SIZE {
            return Err(Error::BadArgument(format!("Number out of range: {}", n)));
        }
        self.append_data(&bytes)
    }

    /// Evaluates the script to completion on a fresh machine
    ///
    /// # Errors
    /// Whatever [`ScriptError`] the machine records.
    pub fn eval(&self, env: &dyn MachineEnv) -> std::result::Result<(), ScriptError> {
        let mut machine = Machine::new();
        machine.set_env(env);
        machine.set_program(&self.0, true)?;
        machine.run()
    }
}

/// Gets the next operation index in the script, or the script length if at the end
#[must_use]
pub fn next_op(i: usize, script: &[u8]) -> usize {
    if i >= script.len() {
        return script.len();
    }
    match script[i] {
        len @ 1..=75 => i + 1 + len as usize,
        OP_PUSHDATA1 => {
            if i + 2 > script.len() {
                script.len()
            } else {
                i + 2 + script[i + 1] as usize
            }
        }
        OP_PUSHDATA2 => {
            if i + 3 > script.len() {
                script.len()
            } else {
                i + 3 + u16::from_le_bytes([script[i + 1], script[i + 2]]) as usize
            }
        }
        OP_PUSHDATA4 => {
            if i + 5 > script.len() {
                script.len()
            } else {
                i + 5
                    + u32::from_le_bytes([
                        script[i + 1],
                        script[i + 2],
                        script[i + 3],
                        script[i + 4],
                    ]) as usize
            }
        }
        _ => i + 1,
    }
}

fn push_payload(script: &[u8], i: usize) -> Option<(usize, usize)> {
    match script[i] {
        len @ 1..=75 => Some((i + 1, len as usize)),
        OP_PUSHDATA1 if i + 2 <= script.len() => Some((i + 2, script[i + 1] as usize)),
        OP_PUSHDATA2 if i + 3 <= script.len() => Some((
            i + 3,
            u16::from_le_bytes([script[i + 1], script[i + 2]]) as usize,
        )),
        OP_PUSHDATA4 if i + 5 <= script.len() => Some((
            i + 5,
            u32::from_le_bytes([script[i + 1], script[i + 2], script[i + 3], script[i + 4]])
                as usize,
        )),
        _ => None,
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let script = &self.0;
        let mut parts: Vec<String> = Vec::new();
        let mut i = 0;
        while i < script.len() {
            let op = script[i];
            if (1..=OP_PUSHDATA4).contains(&op) {
                match push_payload(script, i) {
                    Some((start, len)) if start + len <= script.len() => {
                        let payload = hex::encode(&script[start..start + len]);
                        let mut part = if op <= 75 {
                            format!("OP_PUSH+{}", op)
                        } else {
                            format!("{} {}", name(op).unwrap_or_default(), len)
                        };
                        if !payload.is_empty() {
                            part.push(' ');
                            part.push_str(&payload);
                        }
                        parts.push(part);
                    }
                    _ => {
                        // Truncated push: dump what remains and stop.
                        for &byte in &script[i..] {
                            parts.push(byte.to_string());
                        }
                        break;
                    }
                }
            } else {
                match name(op) {
                    Some(mnemonic) => parts.push(mnemonic.to_string()),
                    None => parts.push(op.to_string()),
                }
            }
            i = next_op(i, script);
        }
        write!(f, "[{}]", parts.join(" "))
    }
}
