//! Machine environment: verification flags and policy callbacks.

use crate::script::ScriptError;
use crate::script::op_codes::*;

/// Do not enable any verification policy.
pub const VERIFY_NONE: u32 = 0;
/// Require pushes and script numbers to use minimal encodings.
pub const VERIFY_MINIMALDATA: u32 = 1 << 6;
/// Reject the upgradable NOP opcodes.
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 7;
/// Enable OP_CHECKLOCKTIMEVERIFY (BIP-65).
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
/// Enable OP_CHECKSEQUENCEVERIFY (BIP-112).
pub const VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
/// Require IF/NOTIF operands to be empty or a single 0x01 byte.
pub const VERIFY_MINIMALIF: u32 = 1 << 13;
/// Enable the re-enabled splice and arithmetic opcodes (CAT, SPLIT,
/// AND, OR, XOR, DIV, MOD, NUM2BIN, BIN2NUM).
pub const ENABLE_MONOLITH_OPCODES: u32 = 1 << 18;

/// Locktime values at or above this are unix timestamps, below are
/// block heights.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;
const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Policy surface consulted by the machine while executing a program.
///
/// The flag-derived predicates have default implementations; an
/// environment only has to provide its flag word and the three
/// transaction-facing callbacks. Signature verification itself is
/// outside the machine; `check_sig` is the black-box boundary.
pub trait MachineEnv {
    /// The raw verification flag word.
    fn flags(&self) -> u32;

    /// Whether `op` may not appear in a program. The permanently
    /// disabled set fails regardless of flags; the re-enabled set is
    /// gated on [`ENABLE_MONOLITH_OPCODES`].
    fn is_opcode_disabled(&self, op: u8) -> bool {
        match op {
            OP_INVERT | OP_2MUL | OP_2DIV | OP_MUL | OP_LSHIFT | OP_RSHIFT => true,
            OP_CAT | OP_SPLIT | OP_AND | OP_OR | OP_XOR | OP_DIV | OP_MOD | OP_NUM2BIN
            | OP_BIN2NUM => self.flags() & ENABLE_MONOLITH_OPCODES == 0,
            _ => false,
        }
    }

    /// Whether script number decodes must be minimally encoded.
    fn minimal_push_required(&self) -> bool {
        self.flags() & VERIFY_MINIMALDATA != 0
    }

    /// Whether `data` could not have been pushed with a shorter opcode
    /// than `op`.
    fn check_minimal_push(&self, op: u8, data: &[u8]) -> bool {
        if data.is_empty() {
            // Could have used OP_0.
            return op == OP_0;
        }
        if data.len() == 1 && data[0] >= 1 && data[0] <= 16 {
            // Could have used OP_1 .. OP_16.
            return op == OP_1 + (data[0] - 1);
        }
        if data.len() == 1 && data[0] == 0x81 {
            // Could have used OP_1NEGATE.
            return op == OP_1NEGATE;
        }
        if data.len() <= 75 {
            // Could have used a direct push.
            return op as usize == data.len();
        }
        if data.len() <= 255 {
            return op == OP_PUSHDATA1;
        }
        if data.len() <= 65535 {
            return op == OP_PUSHDATA2;
        }
        true
    }

    /// Whether `data` is acceptable as an IF/NOTIF operand under the
    /// minimal-if policy.
    fn check_minimal_if(&self, data: &[u8]) -> bool {
        if self.flags() & VERIFY_MINIMALIF == 0 {
            return true;
        }
        data.is_empty() || data == [1]
    }

    /// Whether the upgradable NOP opcodes are rejected.
    fn discourage_upgradable_nops(&self) -> bool {
        self.flags() & VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0
    }

    /// Checks a locktime read by OP_CHECKLOCKTIMEVERIFY.
    ///
    /// # Errors
    /// `ScriptError::CheckLockTimeVerify` when the requirement is not
    /// satisfied by the transaction context.
    fn check_locktime(&self, locktime: i64) -> Result<(), ScriptError>;

    /// Checks a sequence read by OP_CHECKSEQUENCEVERIFY.
    ///
    /// # Errors
    /// `ScriptError::CheckSequenceVerify` when the requirement is not
    /// satisfied by the transaction context.
    fn check_sequence(&self, sequence: i64) -> Result<(), ScriptError>;

    /// Verifies a single signature over `script_code`, the program from
    /// the last OP_CODESEPARATOR onward.
    ///
    /// # Errors
    /// Any `ScriptError` aborts the step with that code; an `Ok(false)`
    /// merely reports an invalid signature.
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
    ) -> Result<bool, ScriptError>;
}

/// Environment with a fixed flag word and no transaction context.
///
/// Flag queries work normally; the transaction-facing callbacks fail,
/// so programs using CHECKSIG or the locktime opcodes cannot pass.
#[derive(Debug, Default, Clone)]
pub struct TransactionlessEnv {
    flags: u32,
}

impl TransactionlessEnv {
    /// Creates the environment with the given flag word.
    #[must_use]
    pub fn new(flags: u32) -> TransactionlessEnv {
        TransactionlessEnv { flags }
    }
}

impl MachineEnv for TransactionlessEnv {
    fn flags(&self) -> u32 {
        self.flags
    }

    fn check_locktime(&self, _locktime: i64) -> Result<(), ScriptError> {
        Err(ScriptError::CheckLockTimeVerify)
    }

    fn check_sequence(&self, _sequence: i64) -> Result<(), ScriptError> {
        Err(ScriptError::CheckSequenceVerify)
    }

    fn check_sig(&self, _sig: &[u8], _pubkey: &[u8], _script: &[u8]) -> Result<bool, ScriptError> {
        Err(ScriptError::UnknownError)
    }
}

/// Environment bound to one input of a transaction.
///
/// Implements the BIP-65 locktime and BIP-112 sequence rules against
/// the stored transaction fields. Signature verification is delegated
/// to the supplied callback, keeping the cryptography outside the
/// machine.
pub struct TransactionEnv<F>
where
    F: Fn(&[u8], &[u8], &[u8]) -> Result<bool, ScriptError>,
{
    flags: u32,
    tx_version: u32,
    tx_lock_time: u32,
    input_sequence: u32,
    check_sig: F,
}

impl<F> TransactionEnv<F>
where
    F: Fn(&[u8], &[u8], &[u8]) -> Result<bool, ScriptError>,
{
    /// Creates an environment for the input being validated.
    #[must_use]
    pub fn new(
        flags: u32,
        tx_version: u32,
        tx_lock_time: u32,
        input_sequence: u32,
        check_sig: F,
    ) -> TransactionEnv<F> {
        TransactionEnv {
            flags,
            tx_version,
            tx_lock_time,
            input_sequence,
            check_sig,
        }
    }
}

impl<F> MachineEnv for TransactionEnv<F>
where
    F: Fn(&[u8], &[u8], &[u8]) -> Result<bool, ScriptError>,
{
    fn flags(&self) -> u32 {
        self.flags
    }

    fn check_locktime(&self, locktime: i64) -> Result<(), ScriptError> {
        if locktime < 0 {
            return Err(ScriptError::CheckLockTimeVerify);
        }

        // Height and timestamp locktimes are not comparable.
        let tx_lock_time = self.tx_lock_time as i64;
        if (locktime >= LOCKTIME_THRESHOLD) != (tx_lock_time >= LOCKTIME_THRESHOLD) {
            return Err(ScriptError::CheckLockTimeVerify);
        }

        if locktime > tx_lock_time {
            return Err(ScriptError::CheckLockTimeVerify);
        }

        // A final sequence means the transaction locktime is inert.
        if self.input_sequence == SEQUENCE_FINAL {
            return Err(ScriptError::CheckLockTimeVerify);
        }

        Ok(())
    }

    fn check_sequence(&self, sequence: i64) -> Result<(), ScriptError> {
        if sequence < 0 {
            return Err(ScriptError::CheckSequenceVerify);
        }

        // A set disable bit in the operand turns the check off.
        if sequence & (SEQUENCE_LOCKTIME_DISABLE_FLAG as i64) != 0 {
            return Ok(());
        }

        if self.tx_version < 2 {
            return Err(ScriptError::CheckSequenceVerify);
        }
        if self.input_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Err(ScriptError::CheckSequenceVerify);
        }

        let mask = (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK) as i64;
        let sequence_masked = sequence & mask;
        let tx_sequence_masked = (self.input_sequence as i64) & mask;
        let type_flag = SEQUENCE_LOCKTIME_TYPE_FLAG as i64;
        if (sequence_masked >= type_flag) != (tx_sequence_masked >= type_flag) {
            return Err(ScriptError::CheckSequenceVerify);
        }

        if sequence_masked > tx_sequence_masked {
            return Err(ScriptError::CheckSequenceVerify);
        }

        Ok(())
    }

    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script: &[u8]) -> Result<bool, ScriptError> {
        (self.check_sig)(sig, pubkey, script)
    }
}
