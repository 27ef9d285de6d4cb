//! The script execution machine.
//!
//! A [`Machine`] owns a loaded program, the dual evaluation stack, the
//! conditional nesting state and a sticky error slot. Policy decisions
//! (disabled opcodes, minimal encodings, locktime and signature checks)
//! are delegated to a [`MachineEnv`] supplied by the caller.
//!
//! [`step`](Machine::step) executes exactly one opcode;
//! [`run`](Machine::run) steps until the program ends or an error is
//! recorded. Errors stay latched until [`set_program`](Machine::set_program)
//! or [`reset`](Machine::reset).

use crate::script::condition::ConditionNest;
use crate::script::env::{
    MachineEnv, VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_CHECKSEQUENCEVERIFY,
};
use crate::script::num::{MAXIMUM_ELEMENT_SIZE, ScriptNum};
use crate::script::op_codes::*;
use crate::script::stack::{Stack, StackItem, cast_to_bool};
use crate::script::{
    MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE,
    MAX_STACK_SIZE, ScriptError,
};
use crate::util::{Error, hash160, sha256d};
use bitcoin_hashes::{
    Hash as BHHash, ripemd160 as bh_ripemd160, sha1 as bh_sha1, sha256 as bh_sha256,
};

/// The locktime and sequence checks read up to five bytes.
const LOCKTIME_ELEMENT_SIZE: usize = 5;

/// A stack machine evaluating one program at a time.
///
/// The environment is referenced, not owned; it must outlive the
/// machine. The main stack optionally carries over between programs so
/// an unlocking script can leave operands for the locking script that
/// follows it; the alt stack is always scoped to a single program.
///
/// # Examples
/// ```
/// use scriptvm::script::op_codes::*;
/// use scriptvm::script::{Machine, TransactionlessEnv, VERIFY_NONE};
///
/// let env = TransactionlessEnv::new(VERIFY_NONE);
/// let mut machine = Machine::new();
/// machine.set_env(&env);
/// machine.set_program(&[OP_2, OP_3, OP_ADD, OP_5, OP_EQUALVERIFY], true).unwrap();
/// machine.run().unwrap();
/// assert_eq!(machine.stack_size(), 0);
/// ```
#[derive(Default)]
pub struct Machine<'e> {
    program: Vec<u8>,
    counter: usize,
    stack: Stack,
    condition: ConditionNest,
    op_counter: usize,
    error: Option<ScriptError>,
    check_index: usize,
    env: Option<&'e dyn MachineEnv>,
}

impl<'e> Machine<'e> {
    /// Creates a machine with no environment and an empty program.
    #[must_use]
    pub fn new() -> Machine<'e> {
        Machine::default()
    }

    /// Installs the policy environment consulted during execution.
    pub fn set_env(&mut self, env: &'e dyn MachineEnv) {
        self.env = Some(env);
    }

    /// Loads a program and rewinds the machine.
    ///
    /// The counter, opcode counter, condition nest and alt stack are
    /// always reset; the main stack is cleared only when `clear_stack`
    /// is set, enabling the two-phase unlock/lock evaluation.
    ///
    /// # Errors
    /// `ScriptError::EnvNotSet` without an environment,
    /// `ScriptError::ScriptSize` when the program exceeds
    /// [`MAX_SCRIPT_SIZE`]. The error is also latched.
    pub fn set_program(&mut self, program: &[u8], clear_stack: bool) -> Result<(), ScriptError> {
        self.program.clear();
        self.program.extend_from_slice(program);
        self.counter = 0;
        self.op_counter = 0;
        self.check_index = 0;
        if clear_stack {
            self.stack.clear();
        }
        self.stack.clear_alt();
        self.condition.clear();
        self.error = self.validate();
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rewinds the loaded program, clearing both stacks and the latched
    /// error.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.op_counter = 0;
        self.check_index = 0;
        self.stack.clear();
        self.condition.clear();
        self.error = self.validate();
    }

    /// Whether the machine sits at the start of its program with no
    /// latched error.
    #[must_use]
    pub fn is_reset(&self) -> bool {
        self.counter == 0 && self.op_counter == 0 && self.error.is_none()
    }

    /// Combined size of the main and alt stacks.
    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    /// The evaluation stack.
    #[must_use]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// The latched error, if any.
    #[must_use]
    pub fn error(&self) -> Option<ScriptError> {
        self.error
    }

    /// Reads the opcode at the counter together with its push payload,
    /// advancing past both.
    ///
    /// # Errors
    /// `ScriptError::ProgramEnded` at the end of a balanced program,
    /// `ScriptError::UnbalancedConditional` at the end with open
    /// branches, `ScriptError::BadOpcode` when a push payload or length
    /// prefix is truncated.
    pub fn fetch(&mut self) -> Result<(u8, Vec<u8>), ScriptError> {
        match fetch_from(&self.program, &mut self.counter) {
            Err(ScriptError::ProgramEnded) if !self.condition.is_empty() => {
                Err(ScriptError::UnbalancedConditional)
            }
            other => other,
        }
    }

    /// Executes one opcode.
    ///
    /// # Errors
    /// The latched error if one is set; otherwise any error the opcode
    /// produces, which becomes latched.
    pub fn step(&mut self) -> Result<(), ScriptError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        match self.execute_op() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.error = Some(err);
                Err(err)
            }
        }
    }

    /// Steps until the program ends or an error is recorded. A clean
    /// end reports `Ok(())`.
    ///
    /// # Errors
    /// The first error any step records, `ProgramEnded` excepted.
    pub fn run(&mut self) -> Result<(), ScriptError> {
        loop {
            match self.step() {
                Ok(()) => {}
                Err(ScriptError::ProgramEnded) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Counts signature operations by scanning the program without
    /// executing it. CHECKSIG and CHECKSIGVERIFY count one each;
    /// CHECKMULTISIG and CHECKMULTISIGVERIFY count the preceding
    /// OP_1..OP_16 push when `accurate` and one precedes them, else
    /// [`MAX_PUBKEYS_PER_MULTISIG`]. The scan stops at a truncated
    /// push.
    ///
    /// # Errors
    /// `Error::IllegalState` unless the machine is in the reset state.
    pub fn sig_op_count(&self, accurate: bool) -> crate::util::Result<usize> {
        if !self.is_reset() {
            return Err(Error::IllegalState(
                "sig op counting requires a rewound machine".to_string(),
            ));
        }
        let mut count = 0;
        let mut counter = 0;
        let mut last_op = OP_INVALIDOPCODE;
        while counter < self.program.len() {
            let (op, _data) = match fetch_from(&self.program, &mut counter) {
                Ok(fetched) => fetched,
                Err(_) => break,
            };
            match op {
                OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    if accurate && (OP_1..=OP_16).contains(&last_op) {
                        count += (last_op - OP_1 + 1) as usize;
                    } else {
                        count += MAX_PUBKEYS_PER_MULTISIG;
                    }
                }
                _ => {}
            }
            last_op = op;
        }
        Ok(count)
    }

    fn validate(&self) -> Option<ScriptError> {
        if self.env.is_none() {
            Some(ScriptError::EnvNotSet)
        } else if self.program.len() > MAX_SCRIPT_SIZE {
            Some(ScriptError::ScriptSize)
        } else {
            None
        }
    }

    fn execute_op(&mut self) -> Result<(), ScriptError> {
        let env = self.env.ok_or(ScriptError::EnvNotSet)?;
        let (op, data) = self.fetch()?;

        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSize);
        }
        // Only opcodes above the small integers count against the cap.
        if op > OP_16 {
            self.op_counter += 1;
            if self.op_counter > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::OpCount);
            }
        }
        // Disabled opcodes fail even inside an untaken branch.
        if env.is_opcode_disabled(op) {
            return Err(ScriptError::DisabledOpcode);
        }

        if (OP_IF..=OP_ENDIF).contains(&op) {
            self.op_condition(op, env)?;
        } else if self.condition.result() {
            if op <= OP_PUSHDATA4 {
                self.op_push(op, data, env)?;
            } else if op <= OP_16 {
                self.op_push_value(op)?;
            } else {
                self.op_non_condition(op, env)?;
            }
        }

        if self.stack.size() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
        Ok(())
    }

    /// Conditional opcodes run even in an untaken branch so the nesting
    /// stays parseable.
    fn op_condition(&mut self, op: u8, env: &dyn MachineEnv) -> Result<(), ScriptError> {
        match op {
            OP_IF | OP_NOTIF => {
                // An untaken surrounding branch must not consume
                // operands, so the arm is opened without a stack read.
                let mut value = false;
                if self.condition.result() {
                    let item = self.stack.pop()?;
                    if !env.check_minimal_if(&item) {
                        return Err(ScriptError::MinimalIf);
                    }
                    value = cast_to_bool(&item);
                }
                if op == OP_IF {
                    self.condition.begin_if(value);
                } else {
                    self.condition.begin_not_if(value);
                }
            }
            OP_ELSE => self.condition.switch_else()?,
            OP_ENDIF => self.condition.end_if()?,
            // OP_VERIF and OP_VERNOTIF
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    fn op_push(&mut self, op: u8, data: StackItem, env: &dyn MachineEnv) -> Result<(), ScriptError> {
        if env.minimal_push_required() && !env.check_minimal_push(op, &data) {
            return Err(ScriptError::MinimalData);
        }
        self.stack.push(data);
        Ok(())
    }

    fn op_push_value(&mut self, op: u8) -> Result<(), ScriptError> {
        let n = match op {
            OP_1NEGATE => -1,
            OP_RESERVED => return Err(ScriptError::BadOpcode),
            _ => (op - OP_1 + 1) as i64,
        };
        self.stack.push(ScriptNum::new(n).to_bytes());
        Ok(())
    }

    fn op_non_condition(&mut self, op: u8, env: &dyn MachineEnv) -> Result<(), ScriptError> {
        let minimal = env.minimal_push_required();
        match op {
            OP_NOP => {}
            OP_NOP1 | OP_NOP4..=OP_NOP10 => {
                if env.discourage_upgradable_nops() {
                    return Err(ScriptError::DiscourageUpgradableNops);
                }
            }
            OP_CHECKLOCKTIMEVERIFY => {
                if env.flags() & VERIFY_CHECKLOCKTIMEVERIFY == 0 {
                    if env.discourage_upgradable_nops() {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                } else {
                    // The operand stays on the stack.
                    let item = self.stack.top(-1)?;
                    let locktime = ScriptNum::from_bytes(item, minimal, LOCKTIME_ELEMENT_SIZE)?;
                    env.check_locktime(locktime.value())?;
                }
            }
            OP_CHECKSEQUENCEVERIFY => {
                if env.flags() & VERIFY_CHECKSEQUENCEVERIFY == 0 {
                    if env.discourage_upgradable_nops() {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                } else {
                    let item = self.stack.top(-1)?;
                    let sequence = ScriptNum::from_bytes(item, minimal, LOCKTIME_ELEMENT_SIZE)?;
                    env.check_sequence(sequence.value())?;
                }
            }
            OP_VERIFY => {
                let item = self.stack.pop()?;
                if !cast_to_bool(&item) {
                    return Err(ScriptError::Verify);
                }
            }
            OP_RETURN => return Err(ScriptError::OpReturn),
            OP_TOALTSTACK => self.stack.to_alt()?,
            OP_FROMALTSTACK => self.stack.from_alt()?,
            OP_2DROP => {
                self.stack.top(-2)?;
                self.stack.pop()?;
                self.stack.pop()?;
            }
            OP_2DUP => {
                let x1 = self.stack.top(-2)?.clone();
                let x2 = self.stack.top(-1)?.clone();
                self.stack.push(x1);
                self.stack.push(x2);
            }
            OP_3DUP => {
                let x1 = self.stack.top(-3)?.clone();
                let x2 = self.stack.top(-2)?.clone();
                let x3 = self.stack.top(-1)?.clone();
                self.stack.push(x1);
                self.stack.push(x2);
                self.stack.push(x3);
            }
            OP_2OVER => {
                let x1 = self.stack.top(-4)?.clone();
                let x2 = self.stack.top(-3)?.clone();
                self.stack.push(x1);
                self.stack.push(x2);
            }
            OP_2ROT => {
                let x1 = self.stack.top(-6)?.clone();
                let x2 = self.stack.top(-5)?.clone();
                self.stack.erase_end(-6, -4);
                self.stack.push(x1);
                self.stack.push(x2);
            }
            OP_2SWAP => {
                self.stack.top(-4)?;
                self.stack.swap_end(-4, -2);
                self.stack.swap_end(-3, -1);
            }
            OP_IFDUP => {
                let top = self.stack.top(-1)?.clone();
                if cast_to_bool(&top) {
                    self.stack.push(top);
                }
            }
            OP_DEPTH => {
                let depth = ScriptNum::new(self.stack.depth() as i64);
                self.stack.push(depth.to_bytes());
            }
            OP_DROP => {
                self.stack.pop()?;
            }
            OP_DUP => {
                let top = self.stack.top(-1)?.clone();
                self.stack.push(top);
            }
            OP_NIP => {
                self.stack.top(-2)?;
                self.stack.erase_end(-2, -1);
            }
            OP_OVER => {
                let item = self.stack.top(-2)?.clone();
                self.stack.push(item);
            }
            OP_PICK | OP_ROLL => {
                let n = {
                    let item = self.stack.pop()?;
                    ScriptNum::from_bytes(&item, minimal, MAXIMUM_ELEMENT_SIZE)?.value()
                };
                if n < 0 || n >= self.stack.depth() as i64 {
                    return Err(ScriptError::InvalidStackOperation);
                }
                let item = self.stack.top(-n - 1)?.clone();
                if op == OP_ROLL {
                    self.stack.erase_end(-n - 1, -n);
                }
                self.stack.push(item);
            }
            OP_ROT => {
                self.stack.top(-3)?;
                self.stack.swap_end(-3, -2);
                self.stack.swap_end(-2, -1);
            }
            OP_SWAP => {
                self.stack.top(-2)?;
                self.stack.swap_end(-2, -1);
            }
            OP_TUCK => {
                let x2 = self.stack.pop()?;
                let x1 = self.stack.pop()?;
                self.stack.push(x2.clone());
                self.stack.push(x1);
                self.stack.push(x2);
            }
            OP_SIZE => {
                let len = self.stack.top(-1)?.len() as i64;
                self.stack.push(ScriptNum::new(len).to_bytes());
            }
            OP_CAT => {
                let suffix = self.stack.pop()?;
                let prefix = self.stack.top(-1)?;
                if prefix.len() + suffix.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptError::PushSize);
                }
                prefix.extend_from_slice(&suffix);
            }
            OP_SPLIT => {
                let position = {
                    let item = self.stack.pop()?;
                    ScriptNum::from_bytes(&item, minimal, MAXIMUM_ELEMENT_SIZE)?.value()
                };
                let data = self.stack.top(-1)?;
                if position < 0 || position as usize > data.len() {
                    return Err(ScriptError::InvalidSplitRange);
                }
                let suffix = data.split_off(position as usize);
                self.stack.push(suffix);
            }
            OP_NUM2BIN => {
                let size = {
                    let item = self.stack.pop()?;
                    ScriptNum::from_bytes(&item, minimal, MAXIMUM_ELEMENT_SIZE)?.value()
                };
                if size < 0 || size as usize > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptError::PushSize);
                }
                let size = size as usize;
                let raw = self.stack.top(-1)?;
                ScriptNum::minimally_encode(raw);
                if raw.len() > size {
                    return Err(ScriptError::ImpossibleEncoding);
                }
                if raw.len() < size {
                    // Zero padding goes between the magnitude and the
                    // preserved sign byte.
                    let mut sign_bit = 0x00;
                    if let Some(last) = raw.last_mut() {
                        sign_bit = *last & 0x80;
                        *last &= 0x7f;
                    }
                    raw.reserve(size - raw.len());
                    while raw.len() < size - 1 {
                        raw.push(0x00);
                    }
                    raw.push(sign_bit);
                }
            }
            OP_BIN2NUM => {
                let raw = self.stack.top(-1)?;
                ScriptNum::minimally_encode(raw);
                if !ScriptNum::is_minimally_encoded(raw, MAXIMUM_ELEMENT_SIZE) {
                    return Err(ScriptError::InvalidNumberRange);
                }
            }
            OP_AND => self.logic_op(|a, b| *a &= b)?,
            OP_OR => self.logic_op(|a, b| *a |= b)?,
            OP_XOR => self.logic_op(|a, b| *a ^= b)?,
            OP_EQUAL => {
                let x2 = self.stack.pop()?;
                let x1 = self.stack.pop()?;
                let equal = x1 == x2;
                self.stack.push(if equal { vec![1] } else { vec![] });
            }
            OP_EQUALVERIFY => {
                let x2 = self.stack.pop()?;
                if *self.stack.top(-1)? == x2 {
                    self.stack.pop()?;
                } else {
                    return Err(ScriptError::EqualVerify);
                }
            }
            OP_1ADD => self.top_num_op(minimal, |n| n + 1)?,
            OP_1SUB => self.top_num_op(minimal, |n| n - 1)?,
            OP_NEGATE => self.top_num_op(minimal, |n| -n)?,
            OP_ABS => self.top_num_op(minimal, |n| if n < 0 { -n } else { n })?,
            OP_NOT => self.top_num_op(minimal, |n| ScriptNum::new((n == 0) as i64))?,
            OP_0NOTEQUAL => self.top_num_op(minimal, |n| ScriptNum::new((n != 0) as i64))?,
            OP_ADD => self.binary_num_op(minimal, |a, b| Ok(a + b))?,
            OP_SUB => self.binary_num_op(minimal, |a, b| Ok(a - b))?,
            OP_DIV => self.binary_num_op(minimal, |a, b| {
                if b == 0 {
                    Err(ScriptError::DivByZero)
                } else {
                    Ok(a / b)
                }
            })?,
            OP_MOD => self.binary_num_op(minimal, |a, b| {
                if b == 0 {
                    Err(ScriptError::ModByZero)
                } else {
                    Ok(a % b)
                }
            })?,
            OP_BOOLAND => {
                self.binary_num_op(minimal, |a, b| {
                    Ok(ScriptNum::new((a != 0 && b != 0) as i64))
                })?
            }
            OP_BOOLOR => {
                self.binary_num_op(minimal, |a, b| {
                    Ok(ScriptNum::new((a != 0 || b != 0) as i64))
                })?
            }
            OP_NUMEQUAL => {
                self.binary_num_op(minimal, |a, b| Ok(ScriptNum::new((a == b) as i64)))?
            }
            OP_NUMEQUALVERIFY => {
                self.binary_num_op(minimal, |a, b| Ok(ScriptNum::new((a == b) as i64)))?;
                let result = self.stack.pop()?;
                if !cast_to_bool(&result) {
                    return Err(ScriptError::NumEqualVerify);
                }
            }
            OP_NUMNOTEQUAL => {
                self.binary_num_op(minimal, |a, b| Ok(ScriptNum::new((a != b) as i64)))?
            }
            OP_LESSTHAN => {
                self.binary_num_op(minimal, |a, b| Ok(ScriptNum::new((a < b) as i64)))?
            }
            OP_GREATERTHAN => {
                self.binary_num_op(minimal, |a, b| Ok(ScriptNum::new((a > b) as i64)))?
            }
            OP_LESSTHANOREQUAL => {
                self.binary_num_op(minimal, |a, b| Ok(ScriptNum::new((a <= b) as i64)))?
            }
            OP_GREATERTHANOREQUAL => {
                self.binary_num_op(minimal, |a, b| Ok(ScriptNum::new((a >= b) as i64)))?
            }
            OP_MIN => self.binary_num_op(minimal, |a, b| Ok(if a < b { a } else { b }))?,
            OP_MAX => self.binary_num_op(minimal, |a, b| Ok(if a > b { a } else { b }))?,
            OP_WITHIN => {
                let bn3 = ScriptNum::from_bytes(self.stack.top(-1)?, minimal, MAXIMUM_ELEMENT_SIZE)?;
                let bn2 = ScriptNum::from_bytes(self.stack.top(-2)?, minimal, MAXIMUM_ELEMENT_SIZE)?;
                let bn1 = ScriptNum::from_bytes(self.stack.top(-3)?, minimal, MAXIMUM_ELEMENT_SIZE)?;
                self.stack.pop()?;
                self.stack.pop()?;
                self.stack.pop()?;
                let within = bn2 <= bn1 && bn1 < bn3;
                self.stack.push(ScriptNum::new(within as i64).to_bytes());
            }
            OP_RIPEMD160 => {
                let top = self.stack.pop()?;
                let digest = bh_ripemd160::Hash::hash(&top).to_byte_array();
                self.stack.push(digest.to_vec());
            }
            OP_SHA1 => {
                let top = self.stack.pop()?;
                let digest = bh_sha1::Hash::hash(&top).to_byte_array();
                self.stack.push(digest.to_vec());
            }
            OP_SHA256 => {
                let top = self.stack.pop()?;
                let digest = bh_sha256::Hash::hash(&top).to_byte_array();
                self.stack.push(digest.to_vec());
            }
            OP_HASH160 => {
                let top = self.stack.pop()?;
                self.stack.push(hash160(&top).0.to_vec());
            }
            OP_HASH256 => {
                let top = self.stack.pop()?;
                self.stack.push(sha256d(&top).0.to_vec());
            }
            OP_CODESEPARATOR => self.check_index = self.counter,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let pubkey = self.stack.pop()?;
                let sig = self.stack.pop()?;
                let script_code = &self.program[self.check_index..];
                let success = env.check_sig(&sig, &pubkey, script_code)?;
                if op == OP_CHECKSIG {
                    self.stack.push(ScriptNum::new(success as i64).to_bytes());
                } else if !success {
                    return Err(ScriptError::CheckSigVerify);
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let success = self.check_multisig(env, minimal)?;
                if op == OP_CHECKMULTISIG {
                    self.stack.push(ScriptNum::new(success as i64).to_bytes());
                } else if !success {
                    return Err(ScriptError::CheckMultiSigVerify);
                }
            }
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    fn check_multisig(
        &mut self,
        env: &dyn MachineEnv,
        minimal: bool,
    ) -> Result<bool, ScriptError> {
        let key_count =
            ScriptNum::from_bytes(self.stack.top(-1)?, minimal, MAXIMUM_ELEMENT_SIZE)?.value();
        if key_count < 0 || key_count as usize > MAX_PUBKEYS_PER_MULTISIG {
            return Err(ScriptError::PubKeyCount);
        }
        // Each key counts against the opcode cap.
        self.op_counter += key_count as usize;
        if self.op_counter > MAX_OPS_PER_SCRIPT {
            return Err(ScriptError::OpCount);
        }
        self.stack.pop()?;
        let mut keys = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            keys.push(self.stack.pop()?);
        }

        let sig_count =
            ScriptNum::from_bytes(self.stack.top(-1)?, minimal, MAXIMUM_ELEMENT_SIZE)?.value();
        if sig_count < 0 || sig_count > key_count {
            return Err(ScriptError::SigCount);
        }
        self.stack.pop()?;
        let mut sigs = Vec::with_capacity(sig_count as usize);
        for _ in 0..sig_count {
            sigs.push(self.stack.pop()?);
        }

        // The historical extra element is consumed without inspection.
        self.stack.pop()?;

        // Signatures must match keys in order, so each failed key is
        // permanently passed over.
        let script_code = &self.program[self.check_index..];
        let mut key = 0;
        let mut sig = 0;
        while sig < sigs.len() {
            if key == keys.len() {
                return Ok(false);
            }
            if env.check_sig(&sigs[sig], &keys[key], script_code)? {
                sig += 1;
            }
            key += 1;
        }
        Ok(true)
    }

    fn top_num_op(
        &mut self,
        minimal: bool,
        f: impl FnOnce(ScriptNum) -> ScriptNum,
    ) -> Result<(), ScriptError> {
        let item = self.stack.top(-1)?;
        let n = ScriptNum::from_bytes(item, minimal, MAXIMUM_ELEMENT_SIZE)?;
        *item = f(n).to_bytes();
        Ok(())
    }

    fn binary_num_op(
        &mut self,
        minimal: bool,
        f: impl FnOnce(ScriptNum, ScriptNum) -> Result<ScriptNum, ScriptError>,
    ) -> Result<(), ScriptError> {
        let bn2 = ScriptNum::from_bytes(self.stack.top(-1)?, minimal, MAXIMUM_ELEMENT_SIZE)?;
        let bn1 = ScriptNum::from_bytes(self.stack.top(-2)?, minimal, MAXIMUM_ELEMENT_SIZE)?;
        let result = f(bn1, bn2)?;
        self.stack.pop()?;
        self.stack.pop()?;
        self.stack.push(result.to_bytes());
        Ok(())
    }

    fn logic_op(&mut self, f: impl Fn(&mut u8, u8)) -> Result<(), ScriptError> {
        let second = self.stack.pop()?;
        let first = self.stack.top(-1)?;
        if first.len() != second.len() {
            return Err(ScriptError::InvalidOperandSize);
        }
        for (a, b) in first.iter_mut().zip(second.iter()) {
            f(a, *b);
        }
        Ok(())
    }
}

/// Reads one opcode and its payload from `program`, advancing `counter`.
fn fetch_from(program: &[u8], counter: &mut usize) -> Result<(u8, Vec<u8>), ScriptError> {
    if *counter >= program.len() {
        return Err(ScriptError::ProgramEnded);
    }
    let op = program[*counter];
    *counter += 1;

    let mut data = Vec::new();
    if op <= OP_PUSHDATA4 {
        let size = match op {
            OP_PUSHDATA1 => {
                if *counter + 1 > program.len() {
                    return Err(ScriptError::BadOpcode);
                }
                let n = program[*counter] as usize;
                *counter += 1;
                n
            }
            OP_PUSHDATA2 => {
                if *counter + 2 > program.len() {
                    return Err(ScriptError::BadOpcode);
                }
                let n = u16::from_le_bytes([program[*counter], program[*counter + 1]]) as usize;
                *counter += 2;
                n
            }
            OP_PUSHDATA4 => {
                if *counter + 4 > program.len() {
                    return Err(ScriptError::BadOpcode);
                }
                let n = u32::from_le_bytes([
                    program[*counter],
                    program[*counter + 1],
                    program[*counter + 2],
                    program[*counter + 3],
                ]) as usize;
                *counter += 4;
                n
            }
            direct => direct as usize,
        };
        // A payload may end exactly at the program end.
        if *counter + size > program.len() {
            return Err(ScriptError::BadOpcode);
        }
        data.extend_from_slice(&program[*counter..*counter + size]);
        *counter += size;
    }

    Ok((op, data))
}
