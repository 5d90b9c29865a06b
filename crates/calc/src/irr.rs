//! IRR solver - bisection trên khoảng cố định.
//!
//! NPV(r) = Σ flow_t / (1+r)^t giảm dần theo r khi flow đầu âm và các flow
//! sau dương, nên bisection luôn hội tụ về nghiệm duy nhất trong khoảng.
//! Kết quả chỉ phụ thuộc vào (flows, max_iterations, npv_tolerance).

use crate::error::{CalcError, CalcResult};
use serde::{Deserialize, Serialize};

/// Cận dưới của khoảng tìm kiếm
pub const RATE_LOWER_BOUND: f64 = -0.99;
/// Cận trên của khoảng tìm kiếm
pub const RATE_UPPER_BOUND: f64 = 1000.0;

pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_NPV_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrrResult {
    /// Midpoint cuối cùng
    pub rate: f64,
    /// NPV tại `rate`
    pub npv: f64,
    pub iterations: u32,
    /// True nếu dừng sớm vì |NPV| < tolerance
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrrSolver {
    max_iterations: u32,
    npv_tolerance: f64,
}

impl Default for IrrSolver {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            npv_tolerance: DEFAULT_NPV_TOLERANCE,
        }
    }
}

impl IrrSolver {
    pub fn new(max_iterations: u32, npv_tolerance: f64) -> CalcResult<Self> {
        if max_iterations == 0 {
            return Err(CalcError::InvalidSolverConfig(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if !npv_tolerance.is_finite() || npv_tolerance < 0.0 {
            return Err(CalcError::InvalidSolverConfig(format!(
                "npv_tolerance must be a non-negative number, got {}",
                npv_tolerance
            )));
        }
        Ok(Self {
            max_iterations,
            npv_tolerance,
        })
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn npv_tolerance(&self) -> f64 {
        self.npv_tolerance
    }

    pub fn solve(&self, flows: &[f64]) -> CalcResult<IrrResult> {
        validate_flows(flows)?;

        let mut lower = RATE_LOWER_BOUND;
        let mut upper = RATE_UPPER_BOUND;
        let mut rate = (lower + upper) / 2.0;
        let mut value = npv(rate, flows);
        let mut iterations = 0;
        let mut converged = false;

        for i in 1..=self.max_iterations {
            rate = (lower + upper) / 2.0;
            value = npv(rate, flows);
            iterations = i;

            if value.abs() < self.npv_tolerance {
                converged = true;
                break;
            }

            // NPV giảm theo rate: dương nghĩa là nghiệm nằm bên phải
            if value > 0.0 {
                lower = rate;
            } else {
                upper = rate;
            }
        }

        Ok(IrrResult {
            rate,
            npv: value,
            iterations,
            converged,
        })
    }
}

/// NPV của `flows` tại `rate`, flow thứ t chiết khấu t kỳ
pub fn npv(rate: f64, flows: &[f64]) -> f64 {
    let base = 1.0 + rate;
    flows
        .iter()
        .enumerate()
        .map(|(t, flow)| flow / base.powi(t as i32))
        .sum()
}

/// Kiểm tra chuỗi cash flow trước khi giải
pub fn validate_flows(flows: &[f64]) -> CalcResult<()> {
    if flows.len() < 2 {
        return Err(CalcError::InsufficientFlows(flows.len()));
    }
    if let Some(t) = flows.iter().position(|f| !f.is_finite()) {
        return Err(CalcError::NonFiniteFlow(t));
    }
    if flows[0] >= 0.0 {
        return Err(CalcError::InvalidInitialFlow(flows[0]));
    }
    if !flows[1..].iter().any(|f| *f > 0.0) {
        return Err(CalcError::NoPositiveFlow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_period_flows(r0: f64) -> Vec<f64> {
        vec![-100.0, 0.0, 0.0, 0.0, 100.0 * (1.0 + r0).powi(4)]
    }

    #[test]
    fn test_recovers_known_rate() {
        let solver = IrrSolver::default();
        for r0 in [-0.45, -0.2, 0.0, 0.05, 0.1, 0.35, 1.0, 2.5, 4.9] {
            let result = solver.solve(&four_period_flows(r0)).unwrap();
            assert!(
                (result.rate - r0).abs() < 1e-3,
                "r0 = {}, solved = {}",
                r0,
                result.rate
            );
        }
    }

    #[test]
    fn test_interim_flows() {
        // -1000 rồi 3 năm 400: IRR ~ 9.7%
        let result = IrrSolver::default()
            .solve(&[-1000.0, 400.0, 400.0, 400.0])
            .unwrap();
        assert!((result.rate - 0.09701).abs() < 1e-4);
        assert!(npv(result.rate, &[-1000.0, 400.0, 400.0, 400.0]).abs() < 1e-3);
    }

    #[test]
    fn test_reproducible() {
        let solver = IrrSolver::new(60, 0.0).unwrap();
        let flows = [-250.0, 30.0, 80.0, 120.0, 90.0];
        let a = solver.solve(&flows).unwrap();
        let b = solver.solve(&flows).unwrap();
        assert_eq!(a.rate.to_bits(), b.rate.to_bits());
        assert_eq!(a.iterations, 60);
        assert!(!a.converged);
    }

    #[test]
    fn test_loose_tolerance_exits_early() {
        let solver = IrrSolver::new(100, 1.0).unwrap();
        let result = solver.solve(&four_period_flows(0.1)).unwrap();
        assert!(result.converged);
        assert!(result.iterations < 100);
        assert!(result.npv.abs() < 1.0);
    }

    #[test]
    fn test_invalid_flows() {
        let solver = IrrSolver::default();
        assert_eq!(solver.solve(&[-100.0]), Err(CalcError::InsufficientFlows(1)));
        assert_eq!(
            solver.solve(&[100.0, 50.0]),
            Err(CalcError::InvalidInitialFlow(100.0))
        );
        assert_eq!(solver.solve(&[-100.0, -5.0]), Err(CalcError::NoPositiveFlow));
        assert_eq!(
            solver.solve(&[-100.0, f64::NAN]),
            Err(CalcError::NonFiniteFlow(1))
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(IrrSolver::new(0, 1e-7).is_err());
        assert!(IrrSolver::new(10, -1.0).is_err());
        assert!(IrrSolver::new(10, f64::INFINITY).is_err());
    }
}
