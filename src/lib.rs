#![deny(missing_docs)]
#![deny(unsafe_code)]

/*! # scriptvm

A stack machine for evaluating Bitcoin-style transaction scripts. The
machine executes a byte program one opcode at a time over a dual
evaluation stack, with policy decisions (disabled opcodes, minimal
encodings, locktime and signature checks) delegated to a pluggable
environment supplied by the embedding validator.

## Usage

```rust
use scriptvm::script::op_codes::*;
use scriptvm::script::{Machine, TransactionlessEnv, VERIFY_NONE};

let env = TransactionlessEnv::new(VERIFY_NONE);
let mut machine = Machine::new();
machine.set_env(&env);
machine.set_program(&[OP_5, OP_4, OP_ADD, OP_9, OP_EQUALVERIFY], true).unwrap();
machine.run().unwrap();
```

## Scope

Transaction-level validation, sighash computation and signature
cryptography live outside this crate; the machine reaches them through
the environment's callbacks. Resource usage is bounded by the script
limits: program length, element size, stack depth and opcode count.
*/

pub mod script;
pub mod util;
