//! Filter Validation Tests
//!
//! Properties the models and filters must satisfy:
//! 1. EKF prediction is exactly x' = Fx + Bu, P' = FPFᵀ + Q
//! 2. Joseph-form updates keep P symmetric and PSD over long horizons
//! 3. Sigma points reproduce (x, P) through the unscented transform
//! 4. UKF, EKF and the closed-form Kalman filter agree on linear systems
//! 5. Model SOC transition agrees with Coulomb counting
//! 6. docv recovers the slope of a quadratic OCV curve

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sox_core::dynamics::{
    DynamicsModel, IsothermalThevenin, LinearTransition, OcvCurve, DEFAULT_SOC_STEP,
};
use sox_core::estimation::{
    unscented_transform, CoulombCounter, ExtendedKalmanFilter, MerweScaledSigmaPoints,
    UnscentedKalmanFilter,
};
use sox_core::math::{asymmetry, SavitzkyGolay};

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

fn random_spd(rng: &mut StdRng, n: usize) -> DMatrix<f64> {
    let a = random_matrix(rng, n, n);
    &a * a.transpose() + DMatrix::identity(n, n) * 0.1
}

fn random_vector(rng: &mut StdRng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0))
}

mod ekf_predict_tests {
    use super::*;

    #[test]
    fn test_predict_is_exact_affine_propagation() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..=4 {
            let x0 = random_vector(&mut rng, n);
            let p0 = random_spd(&mut rng, n);
            let q = random_spd(&mut rng, n);
            let lin = LinearTransition {
                f: random_matrix(&mut rng, n, n),
                b: random_matrix(&mut rng, n, 2),
            };
            let u = random_vector(&mut rng, 2);

            let mut ekf = ExtendedKalmanFilter::new(
                x0.clone(),
                p0.clone(),
                q.clone(),
                DMatrix::identity(1, 1),
            )
            .unwrap();
            ekf.predict(&lin, &u, None).unwrap();

            let expected_x = &lin.f * &x0 + &lin.b * &u;
            let expected_p = &lin.f * &p0 * lin.f.transpose() + &q;
            assert_relative_eq!(*ekf.state_estimate(), expected_x, epsilon = 1e-12);
            assert_relative_eq!(*ekf.covariance(), expected_p, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_predict_with_noise_override() {
        let mut ekf = ExtendedKalmanFilter::new(
            DVector::from_vec(vec![1.0]),
            DMatrix::from_element(1, 1, 2.0),
            DMatrix::from_element(1, 1, 100.0),
            DMatrix::identity(1, 1),
        )
        .unwrap();
        let lin = LinearTransition {
            f: DMatrix::from_element(1, 1, 0.5),
            b: DMatrix::zeros(1, 1),
        };
        let q = DMatrix::from_element(1, 1, 0.25);
        ekf.predict(&lin, &DVector::zeros(1), Some(&q)).unwrap();

        assert_relative_eq!(ekf.covariance()[(0, 0)], 0.5 * 2.0 * 0.5 + 0.25, epsilon = 1e-15);
        // the stored Q is untouched
        assert_eq!(ekf.process_noise()[(0, 0)], 100.0);
    }
}

mod joseph_form_tests {
    use super::*;

    fn min_eigenvalue(p: &DMatrix<f64>) -> f64 {
        let sym = (p + p.transpose()) * 0.5;
        SymmetricEigen::new(sym).eigenvalues.min()
    }

    #[test]
    fn test_covariance_stays_symmetric_psd_with_ill_conditioned_h() {
        let dt = 1.0;
        let lin = LinearTransition {
            f: DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
            b: DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
        };
        // Nearly collinear measurement rows
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0 + 1e-6]);
        let r = DMatrix::identity(2, 2) * 1e-6;

        let mut ekf = ExtendedKalmanFilter::new(
            DVector::from_vec(vec![0.0, 0.0]),
            DMatrix::identity(2, 2) * 100.0,
            DMatrix::identity(2, 2) * 1e-9,
            r,
        )
        .unwrap();

        let u = DVector::from_vec(vec![0.01]);
        for k in 0..5000 {
            ekf.predict(&lin, &u, None).unwrap();
            let t = k as f64;
            let z = DVector::from_vec(vec![t.sin(), t.cos()]);
            ekf.update(&z, |x| Ok(&h * x), |_x| Ok(h.clone()), None).unwrap();

            let p = ekf.covariance();
            assert!(
                asymmetry(p) <= 1e-9 * p.amax().max(1e-12),
                "asymmetric P at step {k}: {p}"
            );
            let min_eig = min_eigenvalue(p);
            assert!(min_eig >= -1e-12 * p.amax(), "negative eigenvalue {min_eig} at step {k}");
        }
    }

    #[test]
    fn test_nonoptimal_noise_override_keeps_psd() {
        // Update with an R override that differs from the stored R
        let mut ekf = ExtendedKalmanFilter::new(
            DVector::from_vec(vec![0.5, 0.0]),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2) * 1e-6,
            DMatrix::identity(1, 1),
        )
        .unwrap();
        let lin = LinearTransition {
            f: DMatrix::identity(2, 2),
            b: DMatrix::zeros(2, 1),
        };
        let h = DMatrix::from_row_slice(1, 2, &[0.7, -1.0]);
        let tiny_r = DMatrix::from_element(1, 1, 1e-12);

        for _ in 0..1000 {
            ekf.predict(&lin, &DVector::zeros(1), None).unwrap();
            ekf.update(
                &DVector::from_vec(vec![0.3]),
                |x| Ok(&h * x),
                |_x| Ok(h.clone()),
                Some(&tiny_r),
            )
            .unwrap();
        }
        assert!(min_eigenvalue(ekf.covariance()) >= -1e-12);
    }
}

mod sigma_point_tests {
    use super::*;

    #[test]
    fn test_points_reproduce_mean_and_covariance() {
        let mut rng = StdRng::seed_from_u64(42);
        for &(alpha, kappa) in &[(1e-3, 0.0), (0.5, 0.0), (1.0, 1.0)] {
            for n in 1..=5 {
                let x = random_vector(&mut rng, n);
                let p = random_spd(&mut rng, n);
                let sp = MerweScaledSigmaPoints::new(n, alpha, 2.0, kappa).unwrap();

                let sigmas = sp.points(&x, &p).unwrap();
                let (mean, cov) = unscented_transform(
                    &sigmas,
                    sp.mean_weights(),
                    sp.covariance_weights(),
                    None,
                )
                .unwrap();

                assert_relative_eq!(mean, x, epsilon = 1e-8);
                assert_relative_eq!(cov, p, epsilon = 1e-8);
            }
        }
    }
}

mod linear_cross_check_tests {
    use super::*;

    /// Textbook Kalman filter for comparison
    struct ClosedFormKalman {
        x: DVector<f64>,
        p: DMatrix<f64>,
    }

    impl ClosedFormKalman {
        fn step(
            &mut self,
            lin: &LinearTransition,
            u: &DVector<f64>,
            q: &DMatrix<f64>,
            h: &DMatrix<f64>,
            r: &DMatrix<f64>,
            z: &DVector<f64>,
        ) {
            self.x = &lin.f * &self.x + &lin.b * u;
            self.p = &lin.f * &self.p * lin.f.transpose() + q;

            let s = h * &self.p * h.transpose() + r;
            let k = &self.p * h.transpose() * s.try_inverse().unwrap();
            self.x = &self.x + &k * (z - h * &self.x);
            self.p = (DMatrix::identity(self.p.nrows(), self.p.ncols()) - &k * h) * &self.p;
        }
    }

    #[test]
    fn test_ukf_ekf_and_closed_form_agree() {
        let dt = 0.1;
        let lin = LinearTransition {
            f: DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
            b: DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
        };
        let h = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
        let q = DMatrix::from_diagonal(&DVector::from_vec(vec![1e-4, 1e-3]));
        let r = DMatrix::from_element(1, 1, 0.05);
        let x0 = DVector::from_vec(vec![0.0, 1.0]);
        let p0 = DMatrix::from_diagonal(&DVector::from_vec(vec![0.5, 0.2]));

        let mut ekf =
            ExtendedKalmanFilter::new(x0.clone(), p0.clone(), q.clone(), r.clone()).unwrap();
        let mut ukf = UnscentedKalmanFilter::new(
            x0.clone(),
            p0.clone(),
            q.clone(),
            r.clone(),
            MerweScaledSigmaPoints::new(2, 1e-3, 2.0, 0.0).unwrap(),
        )
        .unwrap();
        let mut kf = ClosedFormKalman { x: x0, p: p0 };

        for k in 0..100 {
            let t = k as f64 * dt;
            let u = DVector::from_vec(vec![(0.3 * t).cos()]);
            let z = DVector::from_vec(vec![(0.5 * t).sin()]);

            ekf.predict(&lin, &u, None).unwrap();
            ekf.update(&z, |x| Ok(&h * x), |_x| Ok(h.clone()), None).unwrap();

            ukf.predict(|x| Ok(&lin.f * x + &lin.b * &u), None).unwrap();
            ukf.update(&z, |x| Ok(&h * x), None).unwrap();

            kf.step(&lin, &u, &q, &h, &r, &z);

            assert_relative_eq!(*ekf.state_estimate(), kf.x, epsilon = 1e-9);
            assert_relative_eq!(*ekf.covariance(), kf.p, epsilon = 1e-9);
            assert_relative_eq!(*ukf.state_estimate(), kf.x, epsilon = 1e-6);
            assert_relative_eq!(*ukf.covariance(), kf.p, epsilon = 1e-6);
        }
    }
}

mod coulomb_consistency_tests {
    use super::*;

    #[test]
    fn test_model_soc_matches_coulomb_count() {
        let ocv = OcvCurve::from_fn(|s| 3.3 + 0.8 * s, DEFAULT_SOC_STEP, SavitzkyGolay::default())
            .unwrap();
        let model = IsothermalThevenin::new(ocv, 0.01, &[0.01], &[1000.0], 10.0).unwrap();

        let (current, dt) = (10.0, 1.0);
        let mut cc = CoulombCounter::new(0.8, 10.0, dt);
        let mut x = DVector::from_vec(vec![0.8, 0.0]);

        for n in 1..=500 {
            x = model.transition(&x, current, dt).unwrap();
            cc.predict(current);

            assert_eq!(x[0], cc.soc());
            let expected = 0.8 - n as f64 * 10.0 / (10.0 * 3600.0);
            assert_relative_eq!(x[0], expected, epsilon = 1e-12);
        }
    }
}

mod ocv_derivative_tests {
    use super::*;

    #[test]
    fn test_docv_recovers_quadratic_slope() {
        let (a, b, c) = (3.4, 0.9, -0.35);
        let curve = OcvCurve::from_fn(
            |s| a + b * s + c * s * s,
            DEFAULT_SOC_STEP,
            SavitzkyGolay::default(),
        )
        .unwrap();

        for i in 0..=200 {
            let soc = i as f64 * 0.005;
            assert_relative_eq!(curve.docv(soc), b + 2.0 * c * soc, epsilon = 1e-6);
            assert_relative_eq!(curve.ocv(soc), a + b * soc + c * soc * soc, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_smoothed_derivative_beats_finite_differences_on_noisy_table() {
        let mut rng = StdRng::seed_from_u64(2024);
        let step = DEFAULT_SOC_STEP;
        let soc: Vec<f64> = (0..=1000).map(|i| i as f64 * step).collect();
        let truth = |s: f64| 3.4 + 0.9 * s - 0.35 * s * s;
        let slope = |s: f64| 0.9 - 0.7 * s;
        let noisy: Vec<f64> = soc
            .iter()
            .map(|&s| truth(s) + rng.gen_range(-1e-4..1e-4))
            .collect();

        let curve = OcvCurve::with_step(soc.clone(), noisy.clone(), step, SavitzkyGolay::default())
            .unwrap();

        let (mut sg_err, mut fd_err) = (0.0, 0.0);
        for i in 10..990 {
            let forward = (noisy[i + 1] - noisy[i]) / step;
            fd_err += (forward - slope(soc[i])).powi(2);
            sg_err += (curve.docv(soc[i]) - slope(soc[i])).powi(2);
        }
        assert!(sg_err < 0.25 * fd_err, "sg {sg_err} vs fd {fd_err}");
    }
}
