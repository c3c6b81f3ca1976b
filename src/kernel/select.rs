//! Kernel selection table: maps `(opCode-relevant quant triple)` to a
//! concrete matmul kernel at segment-build time, rather than discovering
//! an unsupported combination mid-forward-pass (§4.2, §9 open question
//! "what happens when the selection table has no entry" — resolved as
//! a `KernelUnsupported` build-time error, not a panic).

use crate::quant::ElemType;
use crate::utils::error::EngineError;

/// The concrete matmul kernel body a `(x, w, y)` quant triple resolves
/// to. `select::resolve_matmul` is the only place that inspects the
/// triple; call sites in the executor match on this enum and forward
/// into `kernel::matmul`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatmulKernel {
    F32F32F32,
    Q80Q40F32,
    Q80Q80F32,
}

/// Resolve the matmul kernel for a `(xType, wType, yType)` triple.
/// Unsupported triples are a build-time `KernelUnsupported` error, not a
/// forward-time panic, so a bad model/graph pairing fails before any
/// node does real work.
pub fn resolve_matmul(x: ElemType, w: ElemType, y: ElemType) -> Result<MatmulKernel, EngineError> {
    match (x, w, y) {
        (ElemType::F32, ElemType::F32, ElemType::F32) => Ok(MatmulKernel::F32F32F32),
        (ElemType::Q80, ElemType::Q40, ElemType::F32) => Ok(MatmulKernel::Q80Q40F32),
        (ElemType::Q80, ElemType::Q80, ElemType::F32) => Ok(MatmulKernel::Q80Q80F32),
        _ => Err(EngineError::KernelUnsupported(format!(
            "matmul({:?}, {:?}) -> {:?}",
            x, w, y
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_triples_resolve() {
        assert_eq!(
            resolve_matmul(ElemType::F32, ElemType::F32, ElemType::F32).unwrap(),
            MatmulKernel::F32F32F32
        );
        assert_eq!(
            resolve_matmul(ElemType::Q80, ElemType::Q40, ElemType::F32).unwrap(),
            MatmulKernel::Q80Q40F32
        );
        assert_eq!(
            resolve_matmul(ElemType::Q80, ElemType::Q80, ElemType::F32).unwrap(),
            MatmulKernel::Q80Q80F32
        );
    }

    #[test]
    fn unsupported_triple_is_a_kernel_unsupported_error() {
        let err = resolve_matmul(ElemType::F16, ElemType::Q40, ElemType::F32).unwrap_err();
        assert!(matches!(err, EngineError::KernelUnsupported(_)));
    }
}
