//! Min-ADA sizing and the fee fixed point
//!
//! The fee depends on the serialized size, the size depends on the change
//! output, and the change depends on the fee. [`converge_fee`] iterates
//! `fee -> change -> size -> required fee` until the fee in the draft is
//! exactly the fee the draft requires. A fee above the requirement is tried
//! again at the lower value, since a smaller fee can shrink the change back
//! under a CBOR width boundary. When stepping down would underfund the draft
//! the last covering draft wins.

use super::errors::TxBuilderError;
use crate::address::Address;
use crate::assets::Assets;
use crate::codec::TxCodec;
use crate::structured_logging::BuildLogger;
use crate::transaction::{Transaction, TransactionOutput};
use crate::types::{ExUnits, ProtocolParameters};

/// Rounds of re-sizing when filling an output's lovelace
const MIN_ADA_PASSES: usize = 4;

/// Minimum lovelace for `output` as currently encoded
pub fn min_ada_for(
    codec: &dyn TxCodec,
    params: &ProtocolParameters,
    output: &TransactionOutput,
) -> Result<u64, TxBuilderError> {
    let size = codec.encode_output(output)?.len();
    Ok(params.min_ada_for_size(size))
}

/// Set the output's lovelace to the protocol minimum for its final size
pub fn fill_min_ada(
    codec: &dyn TxCodec,
    params: &ProtocolParameters,
    output: &mut TransactionOutput,
) -> Result<u64, TxBuilderError> {
    let mut lovelace = min_ada_for(codec, params, output)?;
    for _ in 0..MIN_ADA_PASSES {
        output.value.set_lovelace(lovelace as i128);
        let required = min_ada_for(codec, params, output)?;
        if required <= lovelace {
            return Ok(lovelace);
        }
        lovelace = required;
    }
    output.value.set_lovelace(lovelace as i128);
    Ok(lovelace)
}

/// Fill missing lovelace, or reject an output that carries too little
pub fn ensure_min_ada(
    codec: &dyn TxCodec,
    params: &ProtocolParameters,
    output: &mut TransactionOutput,
) -> Result<(), TxBuilderError> {
    if output.lovelace() == 0 {
        fill_min_ada(codec, params, output)?;
        return Ok(());
    }
    let required = min_ada_for(codec, params, output)?;
    let provided = output.lovelace().max(0) as u64;
    if provided < required {
        return Err(TxBuilderError::InsufficientAda { required, provided });
    }
    Ok(())
}

/// Fixed inputs of one fee convergence run
pub(crate) struct FeeTarget<'a> {
    /// consumed - produced, before the fee
    pub balance: &'a Assets,
    pub change_address: &'a Address,
    pub floor: u64,
    pub start_fee: u64,
    pub ex_units: ExUnits,
    pub ref_script_bytes: u64,
    pub max_iterations: u32,
}

#[derive(Debug)]
pub(crate) enum FeeOutcome {
    Converged {
        /// Sized with placeholder key witnesses
        tx: Transaction,
        size: usize,
        fee: u64,
        change: Option<TransactionOutput>,
        iterations: u32,
    },
    /// Change went negative or cannot meet min-ADA at this fee
    NeedsMoreFunds { fee: u64 },
}

/// Split `fee` off the balance: the change output, or dust folded into the fee
fn change_for(
    codec: &dyn TxCodec,
    params: &ProtocolParameters,
    balance: &Assets,
    change_address: &Address,
    fee: u64,
) -> Result<Option<(Option<TransactionOutput>, u64)>, TxBuilderError> {
    let mut change = balance.clone();
    change.adjust(crate::assets::Unit::Lovelace, -(fee as i128));
    if !change.is_non_negative() {
        return Ok(None);
    }
    if change.is_empty() {
        return Ok(Some((None, fee)));
    }
    let output = TransactionOutput::new(change_address.clone(), change);
    let min_ada = min_ada_for(codec, params, &output)? as i128;
    if output.lovelace() >= min_ada {
        return Ok(Some((Some(output), fee)));
    }
    if output.value.has_multi_assets() {
        return Ok(None);
    }
    // Pure-lovelace dust cannot form an output; the ledger takes it as fee
    Ok(Some((None, fee + output.lovelace() as u64)))
}

/// One sized draft at a requested fee
#[derive(Debug)]
struct Draft {
    tx: Transaction,
    size: usize,
    requested: u64,
    /// `requested` plus any folded dust
    fee: u64,
    required: u64,
    change: Option<TransactionOutput>,
}

impl Draft {
    fn covers(&self) -> bool {
        self.required <= self.fee
    }
}

struct FeeSearch<'a, F> {
    codec: &'a dyn TxCodec,
    params: &'a ProtocolParameters,
    target: &'a FeeTarget<'a>,
    logger: &'a BuildLogger,
    assemble: F,
    iterations: u32,
}

impl<'a, F> FeeSearch<'a, F>
where
    F: FnMut(u64, Option<TransactionOutput>) -> Result<Transaction, TxBuilderError>,
{
    /// `None` when the balance cannot fund `fee`
    fn attempt(&mut self, fee: u64) -> Result<Option<Draft>, TxBuilderError> {
        self.iterations += 1;
        let target = self.target;
        let (change, effective_fee) =
            match change_for(self.codec, self.params, target.balance, target.change_address, fee)? {
                Some(split) => split,
                None => return Ok(None),
            };
        let tx = (self.assemble)(effective_fee, change.clone())?;
        let size = self.codec.encode_transaction(&tx)?.len();
        let required = self
            .params
            .min_fee(size, target.ex_units, target.ref_script_bytes)
            .max(target.floor);
        self.logger
            .log_fee_iteration(self.iterations, size, effective_fee, required);
        Ok(Some(Draft {
            tx,
            size,
            requested: fee,
            fee: effective_fee,
            required,
            change,
        }))
    }

    /// Least covering fee in `(short, upper.requested]`; `short` does not cover
    fn lowest_covering(&mut self, mut short: u64, mut upper: Draft) -> Result<Draft, TxBuilderError> {
        while upper.requested - short > 1 {
            let mid = short + (upper.requested - short) / 2;
            match self.attempt(mid)? {
                Some(draft) if draft.covers() => upper = draft,
                _ => short = mid,
            }
        }
        Ok(upper)
    }

    fn converged(&self, draft: Draft) -> FeeOutcome {
        FeeOutcome::Converged {
            tx: draft.tx,
            size: draft.size,
            fee: draft.fee,
            change: draft.change,
            iterations: self.iterations,
        }
    }
}

pub(crate) fn converge_fee<F>(
    codec: &dyn TxCodec,
    params: &ProtocolParameters,
    target: &FeeTarget<'_>,
    logger: &BuildLogger,
    assemble: F,
) -> Result<FeeOutcome, TxBuilderError>
where
    F: FnMut(u64, Option<TransactionOutput>) -> Result<Transaction, TxBuilderError>,
{
    let mut search = FeeSearch {
        codec,
        params,
        target,
        logger,
        assemble,
        iterations: 0,
    };
    let mut fee = target.start_fee.max(target.floor);
    // Last draft whose fee covered its own requirement
    let mut covered: Option<Draft> = None;
    while search.iterations < target.max_iterations {
        let draft = match search.attempt(fee)? {
            Some(draft) if draft.covers() => draft,
            // Underfunded here, or the change widened past a CBOR boundary
            rejected => match (covered.take(), rejected) {
                (Some(upper), _) => {
                    let lowest = search.lowest_covering(fee, upper)?;
                    return Ok(search.converged(lowest));
                }
                (None, Some(short)) => {
                    fee = short.required;
                    continue;
                }
                (None, None) => return Ok(FeeOutcome::NeedsMoreFunds { fee }),
            },
        };
        // Folded dust is owed to the ledger either way
        if draft.required == draft.fee || draft.fee > draft.requested {
            return Ok(search.converged(draft));
        }
        fee = draft.required;
        covered = Some(draft);
    }
    match covered {
        Some(draft) => Ok(search.converged(draft)),
        None => Err(TxBuilderError::FeeConvergence {
            iterations: target.max_iterations,
        }),
    }
}
