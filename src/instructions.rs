//! Voice instruction dispatch.
//!
//! Fires each instruction's announcement callback exactly once, when
//! the remaining distance to the step end shrinks past the trigger
//! point.

use crate::route::Step;

/// Evaluate a step's instructions against the remaining distance.
///
/// Every unannounced instruction whose trigger distance exceeds
/// `distance_from_step_end_m` fires the callback once, in instruction
/// order, and is marked announced. Instructions on steps the tracker
/// jumped over are never evaluated and therefore never fire.
pub fn evaluate_instructions(
    step: &mut Step,
    distance_from_step_end_m: f64,
    announce: &mut dyn FnMut(&str),
) {
    for instruction in &mut step.voice_instructions {
        if instruction.trigger_distance_m > distance_from_step_end_m
            && !instruction.is_announced()
        {
            announce(&instruction.announcement);
            instruction.mark_announced();
        }
    }
}
