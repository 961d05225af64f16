//! Auxiliary selection mask
//!
//! After the feature-axis rotate-and-sum, slot `j·batch` holds sample `j`'s
//! dot product and the other slots of the group hold sums that straddle into
//! the next sample. The mask keeps only the representative slot of each group.

use crate::error::{config_err, Result};
use crate::layout::SlotLayout;
use crate::params::PrecisionPlan;
use crate::scheme::Scheme;

/// Encoded 0/1 mask at `p_bits`, tagged with the packing shape it was built for.
///
/// Read-only after construction; one mask serves every iteration and every
/// update rule for the same layout.
#[derive(Debug, Clone)]
pub struct AuxMask<P> {
    plaintext: P,
    slots: usize,
    batch: usize,
    p_bits: u32,
}

impl<P> AuxMask<P> {
    pub fn plaintext(&self) -> &P {
        &self.plaintext
    }

    pub fn p_bits(&self) -> u32 {
        self.p_bits
    }

    /// Check the mask was generated for `layout` and `plan`.
    pub fn check(&self, layout: &SlotLayout, plan: &PrecisionPlan) -> Result<()> {
        if self.slots != layout.slots() || self.batch != layout.batch() || self.p_bits != plan.p_bits {
            return Err(config_err!(
                "mask built for slots={} batch={} p_bits={}, used with slots={} batch={} p_bits={}",
                self.slots,
                self.batch,
                self.p_bits,
                layout.slots(),
                layout.batch(),
                plan.p_bits
            ));
        }
        Ok(())
    }
}

/// Build the mask: 1 at every slot `j·batch`, 0 elsewhere.
pub fn generate_aux_mask<S: Scheme>(
    scheme: &S,
    layout: &SlotLayout,
    plan: &PrecisionPlan,
) -> Result<AuxMask<S::Plaintext>> {
    let values: Vec<f64> = (0..layout.slots())
        .map(|s| if s % layout.batch() == 0 { 1.0 } else { 0.0 })
        .collect();

    Ok(AuxMask {
        plaintext: scheme.encode(&values, plan.p_bits)?,
        slots: layout.slots(),
        batch: layout.batch(),
        p_bits: plan.p_bits,
    })
}
