//! Error codes reported by the script machine.

use std::fmt;

/// Failure kind observed while loading or executing a program.
///
/// Once the machine records one of these, every further `step` or `run`
/// returns the same value until `set_program` or `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    /// No environment was installed before loading a program.
    EnvNotSet,
    /// The program exceeds the maximum script size.
    ScriptSize,
    /// A pushed item exceeds the maximum element size.
    PushSize,
    /// The executed opcode count exceeds the per-script cap.
    OpCount,
    /// The combined main and alt stack depth exceeds the cap.
    StackSize,
    /// A stack read or pop reached below the stack bottom.
    InvalidStackOperation,
    /// An unknown, reserved or truncated opcode was executed.
    BadOpcode,
    /// A disabled opcode appeared in the program.
    DisabledOpcode,
    /// ELSE/ENDIF without IF, or IF left open at program end.
    UnbalancedConditional,
    /// A push did not use the shortest possible encoding.
    MinimalData,
    /// An IF/NOTIF operand was not empty or a single 0x01 byte.
    MinimalIf,
    /// An upgradable NOP was executed under the discourage policy.
    DiscourageUpgradableNops,
    /// OP_VERIFY popped a false value.
    Verify,
    /// OP_EQUALVERIFY operands differ.
    EqualVerify,
    /// OP_NUMEQUALVERIFY operands differ.
    NumEqualVerify,
    /// OP_CHECKSIGVERIFY signature check failed.
    CheckSigVerify,
    /// OP_CHECKMULTISIGVERIFY signature check failed.
    CheckMultiSigVerify,
    /// The locktime requirement is unsatisfied.
    CheckLockTimeVerify,
    /// The sequence requirement is unsatisfied.
    CheckSequenceVerify,
    /// OP_RETURN was executed.
    OpReturn,
    /// OP_DIV with a zero divisor.
    DivByZero,
    /// OP_MOD with a zero divisor.
    ModByZero,
    /// Bitwise operands have different lengths.
    InvalidOperandSize,
    /// OP_SPLIT position lies outside the operand.
    InvalidSplitRange,
    /// OP_NUM2BIN target width cannot hold the number.
    ImpossibleEncoding,
    /// A script number was too large or not minimally encoded.
    InvalidNumberRange,
    /// More signatures than public keys, or a negative count.
    SigCount,
    /// Public key count outside the multisig bounds.
    PubKeyCount,
    /// The program counter reached the end of a balanced program.
    ProgramEnded,
    /// A failure that maps to no other kind.
    UnknownError,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ScriptError::EnvNotSet => "environment not set",
            ScriptError::ScriptSize => "script size limit exceeded",
            ScriptError::PushSize => "push size limit exceeded",
            ScriptError::OpCount => "operation limit exceeded",
            ScriptError::StackSize => "stack size limit exceeded",
            ScriptError::InvalidStackOperation => "invalid stack operation",
            ScriptError::BadOpcode => "bad opcode",
            ScriptError::DisabledOpcode => "disabled opcode",
            ScriptError::UnbalancedConditional => "unbalanced conditional",
            ScriptError::MinimalData => "non-minimal push",
            ScriptError::MinimalIf => "non-minimal IF operand",
            ScriptError::DiscourageUpgradableNops => "upgradable NOP discouraged",
            ScriptError::Verify => "VERIFY failed",
            ScriptError::EqualVerify => "EQUALVERIFY failed",
            ScriptError::NumEqualVerify => "NUMEQUALVERIFY failed",
            ScriptError::CheckSigVerify => "CHECKSIGVERIFY failed",
            ScriptError::CheckMultiSigVerify => "CHECKMULTISIGVERIFY failed",
            ScriptError::CheckLockTimeVerify => "locktime requirement not satisfied",
            ScriptError::CheckSequenceVerify => "sequence requirement not satisfied",
            ScriptError::OpReturn => "OP_RETURN encountered",
            ScriptError::DivByZero => "division by zero",
            ScriptError::ModByZero => "modulo by zero",
            ScriptError::InvalidOperandSize => "operand size mismatch",
            ScriptError::InvalidSplitRange => "split position out of range",
            ScriptError::ImpossibleEncoding => "impossible encoding",
            ScriptError::InvalidNumberRange => "invalid script number",
            ScriptError::SigCount => "signature count out of range",
            ScriptError::PubKeyCount => "public key count out of range",
            ScriptError::ProgramEnded => "program ended",
            ScriptError::UnknownError => "unknown error",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ScriptError {}
