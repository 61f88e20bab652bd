#[cfg(test)]
mod causal_tests {
    use crate::causal::iivm::{Iivm, Subgroups};
    use crate::causal::irm::{Irm, IrmScore};
    use crate::causal::lpq::Lpq;
    use crate::causal::pliv::Pliv;
    use crate::causal::plr::{Plr, PlrScore};
    use crate::config::{DmlProcedure, DoubleMLConfig};
    use crate::data::DoubleMLData;
    use crate::double_ml::DoubleML;
    use crate::errors::DoubleMLError;
    use crate::inference::{BootstrapMethod, PAdjustMethod};
    use crate::learner::testing::{LogisticClassifier, OlsRegressor, SignClassifier};
    use crate::learner::{DummyLearner, Learner};
    use crate::nuisance::ExternalPredictions;
    use crate::resampling::{kfold_contiguous, SampleSplitting};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn ols() -> Box<dyn Learner> {
        Box::new(OlsRegressor::default())
    }

    fn logit() -> Box<dyn Learner> {
        Box::new(LogisticClassifier::default())
    }

    fn dummy() -> Box<dyn Learner> {
        Box::new(DummyLearner)
    }

    fn normals(rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..n).map(|_| rng.sample(StandardNormal)).collect()
    }

    fn sigmoid(v: f64) -> f64 {
        1.0 / (1.0 + (-v).exp())
    }

    fn cfg(n_folds: usize, n_rep: usize, seed: u64) -> DoubleMLConfig {
        DoubleMLConfig {
            n_folds,
            n_rep,
            seed,
            num_threads: Some(2),
            ..Default::default()
        }
    }

    /// `y = theta d + x1 + 0.5 x2 + e`, `d = 0.8 x1 + v`.
    fn plr_data(n: usize, theta: f64, seed: u64) -> DoubleMLData {
        let mut rng = StdRng::seed_from_u64(seed);
        let x1 = normals(&mut rng, n);
        let x2 = normals(&mut rng, n);
        let v = normals(&mut rng, n);
        let e = normals(&mut rng, n);
        let d: Vec<f64> = (0..n).map(|i| 0.8 * x1[i] + v[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| theta * d[i] + x1[i] + 0.5 * x2[i] + e[i]).collect();
        DoubleMLData::from_arrays(y, vec![d], vec![x1, x2]).unwrap()
    }

    /// Binary treatment with propensity `sigmoid(x1)` and effect `theta`.
    fn irm_data(n: usize, theta: f64, seed: u64) -> DoubleMLData {
        let mut rng = StdRng::seed_from_u64(seed);
        let x1 = normals(&mut rng, n);
        let x2 = normals(&mut rng, n);
        let e = normals(&mut rng, n);
        let d: Vec<f64> = x1
            .iter()
            .map(|x| if rng.gen::<f64>() < sigmoid(*x) { 1.0 } else { 0.0 })
            .collect();
        let y: Vec<f64> = (0..n).map(|i| theta * d[i] + x1[i] + x2[i] + e[i]).collect();
        DoubleMLData::from_arrays(y, vec![d], vec![x1, x2]).unwrap()
    }

    /// Binary instrument and treatment with always-takers, never-takers and compliers.
    fn iv_binary_data(n: usize, theta: f64, seed: u64) -> DoubleMLData {
        let mut rng = StdRng::seed_from_u64(seed);
        let x1 = normals(&mut rng, n);
        let v = normals(&mut rng, n);
        let e = normals(&mut rng, n);
        let z: Vec<f64> = x1
            .iter()
            .map(|x| if rng.gen::<f64>() < sigmoid(0.5 * x) { 1.0 } else { 0.0 })
            .collect();
        let d: Vec<f64> = (0..n)
            .map(|i| {
                let take_up = if z[i] == 1.0 { v[i] > -0.8 } else { v[i] > 1.0 };
                if take_up {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        let y: Vec<f64> = (0..n)
            .map(|i| theta * d[i] + 0.5 * x1[i] + 0.3 * v[i] + e[i])
            .collect();
        DoubleMLData::from_arrays(y, vec![d], vec![x1])
            .unwrap()
            .with_instruments(vec![z])
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // PLR
    // -----------------------------------------------------------------------

    #[test]
    fn test_plr_recovers_effect() {
        let data = plr_data(600, 0.5, 1);
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(5, 1, 42)).unwrap();
        let est = dml.fit().unwrap();
        assert!((est.coef()[0] - 0.5).abs() < 0.15, "coef {}", est.coef()[0]);
        assert!(est.se()[0] > 0.0 && est.se()[0] < 0.2);
        let ci = dml.confint(0.95, false).unwrap();
        assert!(ci[0].0 < 0.5 && ci[0].1 > 0.5);
    }

    #[test]
    fn test_plr_iv_type_score() {
        let data = plr_data(600, 0.5, 2);
        let model = Plr::new(ols(), ols(), None, PlrScore::IvType).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(4, 1, 3)).unwrap().set_store_predictions(true);
        dml.fit().unwrap();
        assert!((dml.coef().unwrap()[0] - 0.5).abs() < 0.15);
        assert!(dml.predictions("d", 0).unwrap().contains_key("ml_g"));
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let fit = || {
            let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
            let mut dml = DoubleML::new(plr_data(200, 1.0, 7), model, cfg(3, 2, 11)).unwrap();
            let est = dml.fit().unwrap();
            (est.coef().to_vec(), est.se().to_vec())
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_dml1_and_dml2_agree() {
        let data = plr_data(500, 0.5, 4);
        let dml2 = {
            let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
            let mut dml = DoubleML::new(data.clone(), model, cfg(5, 1, 5)).unwrap();
            dml.fit().unwrap().coef()[0]
        };
        let dml1 = {
            let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
            let mut dml = DoubleML::new(data, model, cfg(5, 1, 5))
                .unwrap()
                .set_dml_procedure(DmlProcedure::Dml1);
            dml.fit().unwrap().coef()[0]
        };
        assert!((dml1 - dml2).abs() < 0.05, "dml1 {} dml2 {}", dml1, dml2);
    }

    #[test]
    fn test_external_predictions_reproduce_plr() {
        let data = plr_data(300, 0.5, 8);
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let mut dml = DoubleML::new(data.clone(), model, cfg(3, 2, 9))
            .unwrap()
            .set_store_predictions(true);
        let coef = dml.fit().unwrap().coef()[0];
        let external = dml.predictions_as_external().unwrap();

        let model = Plr::new(dummy(), dummy(), None, PlrScore::PartiallingOut).unwrap();
        let mut replay = DoubleML::new(data, model, cfg(3, 2, 9)).unwrap();
        let replayed = replay.fit_with_external(Some(&external)).unwrap().coef()[0];
        assert!((coef - replayed).abs() < 1e-4);
    }

    #[test]
    fn test_multiple_repetitions_and_treatments() {
        let n = 400;
        let mut rng = StdRng::seed_from_u64(12);
        let x1 = normals(&mut rng, n);
        let d1: Vec<f64> = normals(&mut rng, n).iter().zip(&x1).map(|(v, x)| v + 0.5 * x).collect();
        let d2 = normals(&mut rng, n);
        let e = normals(&mut rng, n);
        let y: Vec<f64> = (0..n).map(|i| 1.0 * d1[i] + 0.0 * d2[i] + x1[i] + e[i]).collect();
        let data = DoubleMLData::from_arrays(y, vec![d1, d2], vec![x1]).unwrap();

        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(4, 3, 13)).unwrap();
        dml.fit().unwrap();
        let est = dml.estimate().unwrap();
        assert_eq!(est.names(), &["d1".to_string(), "d2".to_string()]);
        assert_eq!(est.all_coef()[0].len(), 3);
        assert_eq!(est.n_rep(), 3);

        let mut rng = StdRng::seed_from_u64(0);
        dml.bootstrap(BootstrapMethod::Normal, 300, &mut rng).unwrap();
        let pointwise = dml.confint(0.95, false).unwrap();
        let joint = dml.confint(0.95, true).unwrap();
        for (p, j) in pointwise.iter().zip(&joint) {
            assert!(j.0 <= p.0 && j.1 >= p.1);
        }
        let rw = dml.p_adjust(PAdjustMethod::RomanoWolf).unwrap();
        let bonferroni = dml.p_adjust(PAdjustMethod::Bonferroni).unwrap();
        assert!(rw[0] < 0.05);
        assert!(bonferroni[1] > rw[0]);
        let summary = dml.summary(0.95).unwrap();
        assert!(summary.to_string().contains("d2"));
    }

    #[test]
    fn test_cluster_robust_standard_errors() {
        let n = 300;
        let data = plr_data(n, 0.5, 14)
            .with_clusters((0..n as i64).map(|i| i % 30).collect())
            .unwrap();
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(3, 1, 15)).unwrap();
        let est = dml.fit().unwrap();
        assert!(est.se()[0].is_finite() && est.se()[0] > 0.0);
    }

    // -----------------------------------------------------------------------
    // PLIV
    // -----------------------------------------------------------------------

    #[test]
    fn test_pliv_recovers_effect_under_confounding() {
        let n = 800;
        let mut rng = StdRng::seed_from_u64(16);
        let x1 = normals(&mut rng, n);
        let z: Vec<f64> = normals(&mut rng, n).iter().zip(&x1).map(|(v, x)| v + 0.5 * x).collect();
        let u = normals(&mut rng, n);
        let v = normals(&mut rng, n);
        let d: Vec<f64> = (0..n).map(|i| z[i] + x1[i] + u[i] + 0.5 * v[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| 0.7 * d[i] + x1[i] + u[i]).collect();
        let data = DoubleMLData::from_arrays(y, vec![d], vec![x1])
            .unwrap()
            .with_instruments(vec![z])
            .unwrap();
        let mut dml = DoubleML::new(data, Pliv::new(ols(), ols(), ols()).unwrap(), cfg(5, 1, 17)).unwrap();
        let coef = dml.fit().unwrap().coef()[0];
        assert!((coef - 0.7).abs() < 0.2, "coef {}", coef);
    }

    // -----------------------------------------------------------------------
    // IRM
    // -----------------------------------------------------------------------

    #[test]
    fn test_irm_ate_and_atte() {
        for score in [IrmScore::Ate, IrmScore::Atte] {
            let model = Irm::new(ols(), logit(), score).unwrap();
            let mut dml = DoubleML::new(irm_data(800, 1.0, 18), model, cfg(5, 1, 19)).unwrap();
            let coef = dml.fit().unwrap().coef()[0];
            assert!((coef - 1.0).abs() < 0.3, "{:?} coef {}", score, coef);
        }
    }

    #[test]
    fn test_irm_external_predictions_reproduce_fit() {
        let data = irm_data(300, 1.0, 20);
        let model = Irm::new(ols(), logit(), IrmScore::Ate).unwrap();
        let mut dml = DoubleML::new(data.clone(), model, cfg(3, 1, 21))
            .unwrap()
            .set_store_predictions(true);
        let coef = dml.fit().unwrap().coef()[0];
        let external = dml.predictions_as_external().unwrap();

        let model = Irm::new(dummy(), dummy(), IrmScore::Ate).unwrap();
        let mut replay = DoubleML::new(data, model, cfg(3, 1, 21)).unwrap();
        let replayed = replay.fit_with_external(Some(&external)).unwrap().coef()[0];
        assert!((coef - replayed).abs() < 1e-4);
    }

    #[test]
    fn test_irm_propensity_is_trimmed() {
        let data = irm_data(200, 1.0, 22);
        let model = Irm::new(ols(), Box::new(SignClassifier), IrmScore::Ate).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(2, 1, 23)).unwrap().set_store_predictions(true);
        let coef = dml.fit().unwrap().coef()[0];
        assert!(coef.is_finite());
        let m = &dml.predictions("d", 0).unwrap()["ml_m"];
        assert!(m.iter().all(|p| *p >= 0.01 && *p <= 1.0 - 0.01));
    }

    #[test]
    fn test_irm_cate_projection() {
        let data = irm_data(500, 1.0, 24);
        let x1 = data.x().get_col(0).to_vec();
        let model = Irm::new(ols(), logit(), IrmScore::Ate).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(3, 1, 25)).unwrap();
        dml.fit().unwrap();
        let cate = dml.cate(vec![vec![1.0; x1.len()], x1]).unwrap();
        assert_eq!(cate.coef().unwrap().len(), 2);
        assert!((cate.coef().unwrap()[0] - 1.0).abs() < 0.4);

        let grid = vec![vec![1.0; 3], vec![-1.0, 0.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let bands = cate.confint(&grid, true, 0.95, 200, &mut rng).unwrap();
        assert_eq!(bands.len(), 3);
        assert!(bands.iter().all(|(lo, g, hi)| lo <= g && g <= hi));
    }

    #[test]
    fn test_irm_rejects_continuous_treatment() {
        let model = Irm::new(ols(), logit(), IrmScore::Ate).unwrap();
        let res = DoubleML::new(plr_data(50, 0.5, 0), model, cfg(2, 1, 0));
        assert!(matches!(res, Err(DoubleMLError::IncompatibleData(_))));
    }

    // -----------------------------------------------------------------------
    // IIVM
    // -----------------------------------------------------------------------

    #[test]
    fn test_iivm_recovers_late() {
        let model = Iivm::new(ols(), logit(), logit()).unwrap();
        let mut dml = DoubleML::new(iv_binary_data(1500, 1.0, 26), model, cfg(5, 1, 27)).unwrap();
        let coef = dml.fit().unwrap().coef()[0];
        assert!((coef - 1.0).abs() < 0.35, "coef {}", coef);
    }

    #[test]
    fn test_iivm_without_always_takers() {
        use crate::double_ml::CausalModel;
        let model = Iivm::new(ols(), logit(), logit()).unwrap().with_subgroups(Subgroups {
            always_takers: false,
            never_takers: true,
        });
        assert_eq!(model.nuisance_names(), vec!["ml_g0", "ml_g1", "ml_m", "ml_r1"]);
        let mut dml = DoubleML::new(iv_binary_data(400, 1.0, 28), model, cfg(3, 1, 29))
            .unwrap()
            .set_store_predictions(true);
        assert!(dml.fit().unwrap().coef()[0].is_finite());
        assert!(!dml.predictions("d", 0).unwrap().contains_key("ml_r0"));
    }

    // -----------------------------------------------------------------------
    // LPQ
    // -----------------------------------------------------------------------

    #[test]
    fn test_lpq_estimates_median_of_treated_compliers() {
        let data = iv_binary_data(1500, 1.0, 30);
        let model = Lpq::new(logit(), 1, 0.5).unwrap();
        let mut dml = DoubleML::new(data.clone(), model, cfg(3, 1, 31))
            .unwrap()
            .set_store_predictions(true);
        let est = dml.fit().unwrap();
        let coef = est.coef()[0];
        let se = est.se()[0];
        assert!(coef.is_finite() && se.is_finite() && se > 0.0);
        // complier outcomes under treatment are centred near 1
        assert!((coef - 1.0).abs() < 0.3, "coef {}", coef);

        let predictions = dml.predictions("d", 0).unwrap();
        for name in ["ml_pi_z", "ml_pi_d_z0", "ml_pi_d_z1", "ml_pi_du_z0", "ml_pi_du_z1", "ipw_quantile"] {
            assert!(predictions[name].iter().all(|p| p.is_finite()), "{}", name);
        }
        let elements = dml.score_elements("d", 0).unwrap();
        assert!(elements.contains_key("comp_prob"));

        let model = Lpq::new(logit(), 1, 0.5).unwrap();
        let mut dml1 = DoubleML::new(data, model, cfg(3, 1, 31))
            .unwrap()
            .set_dml_procedure(DmlProcedure::Dml1);
        let coef_dml1 = dml1.fit().unwrap().coef()[0];
        assert!((coef_dml1 - coef).abs() < 0.1, "dml1 {} dml2 {}", coef_dml1, coef);
    }

    #[test]
    fn test_lpq_nested_seed_changes_preliminary_split() {
        let fit = |seed: u64| {
            let model = Lpq::new(logit(), 0, 0.25).unwrap().with_nested_seed(seed);
            let mut dml = DoubleML::new(iv_binary_data(400, 1.0, 32), model, cfg(2, 1, 33))
                .unwrap()
                .set_store_predictions(true);
            dml.fit().unwrap();
            let predictions = dml.predictions("d", 0).unwrap();
            (predictions["ml_pi_du_z1"].clone(), predictions["ipw_quantile"].clone())
        };
        let (du_42, ipw_42) = fit(42);
        assert_eq!((du_42.clone(), ipw_42.clone()), fit(42));
        let (du_7, _) = fit(7);
        assert_ne!(du_42, du_7);
    }

    #[test]
    fn test_lpq_external_predictions_reproduce_fit() {
        let data = iv_binary_data(600, 1.0, 35);
        for procedure in [DmlProcedure::Dml2, DmlProcedure::Dml1] {
            let model = Lpq::new(logit(), 1, 0.5).unwrap();
            let mut dml = DoubleML::new(data.clone(), model, cfg(3, 2, 36))
                .unwrap()
                .set_store_predictions(true)
                .set_dml_procedure(procedure);
            let coef = dml.fit().unwrap().coef()[0];
            let external = dml.predictions_as_external().unwrap();
            assert!(external.get("d", "ipw_quantile").is_some());

            let model = Lpq::new(dummy(), 1, 0.5).unwrap();
            let mut replay = DoubleML::new(data.clone(), model, cfg(3, 2, 36))
                .unwrap()
                .set_dml_procedure(procedure);
            let replayed = replay.fit_with_external(Some(&external)).unwrap().coef()[0];
            assert!((coef - replayed).abs() < 1e-8, "{:?}: {} vs {}", procedure, coef, replayed);
        }
    }

    #[test]
    fn test_lpq_nested_stage_needs_enough_training_data() {
        // 6 folds of 12 observations leave 5 rows for the preliminary 6-fold split
        let n = 12;
        let y: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let d: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let z: Vec<f64> = (0..n).map(|i| ((i / 2) % 2) as f64).collect();
        let x: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
        let data = DoubleMLData::from_arrays(y, vec![d], vec![x])
            .unwrap()
            .with_instruments(vec![z])
            .unwrap();
        let model = Lpq::new(logit(), 1, 0.5).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(6, 1, 0)).unwrap();
        match dml.fit() {
            Err(DoubleMLError::DegenerateFold { nuisance, rep, .. }) => {
                assert_eq!(nuisance, "ml_pi_z");
                assert_eq!(rep, 0);
            }
            other => panic!("expected a degenerate fold, got {:?}", other.map(|e| e.coef().to_vec())),
        }
    }

    #[test]
    fn test_lpq_score_without_sign_change_is_not_bracketed() {
        // Treated outcomes 1..4 are all instrumented; with these nuisances the
        // mean score is at least 0.25 - quantile over the whole search range.
        let n = 8;
        let y: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        let z: Vec<f64> = (0..n).map(|i| if i < 4 { 1.0 } else { 0.0 }).collect();
        let d = z.clone();
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let data = DoubleMLData::from_arrays(y, vec![d], vec![x])
            .unwrap()
            .with_instruments(vec![z])
            .unwrap();

        let mut external = ExternalPredictions::new();
        for (name, value) in [
            ("ml_pi_z", 0.5),
            ("ml_pi_d_z0", 0.2),
            ("ml_pi_d_z1", 0.8),
            ("ml_pi_du_z0", 0.3),
            ("ml_pi_du_z1", 0.6),
        ] {
            external.insert("d", name, vec![vec![value; n]]);
        }
        let model = Lpq::new(dummy(), 1, 0.1).unwrap();
        let mut dml = DoubleML::new(data, model, cfg(2, 1, 0)).unwrap();
        assert!(matches!(
            dml.fit_with_external(Some(&external)),
            Err(DoubleMLError::RootNotBracketed { .. })
        ));
    }

    #[test]
    fn test_lpq_rejects_cluster_data() {
        let data = iv_binary_data(100, 1.0, 34)
            .with_clusters((0..100).map(|i| i % 10).collect())
            .unwrap();
        let model = Lpq::new(logit(), 1, 0.5).unwrap();
        assert!(matches!(
            DoubleML::new(data, model, cfg(2, 1, 0)),
            Err(DoubleMLError::IncompatibleData(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Configuration and learner errors
    // -----------------------------------------------------------------------

    #[test]
    fn test_invalid_configuration() {
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        assert!(matches!(
            DoubleML::new(plr_data(50, 0.5, 0), model, cfg(1, 1, 0)),
            Err(DoubleMLError::InvalidConfiguration(..))
        ));
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        assert!(DoubleML::new(plr_data(50, 0.5, 0), model, cfg(2, 0, 0)).is_err());
    }

    #[test]
    fn test_incompatible_learners() {
        assert!(matches!(
            Plr::new(logit(), ols(), None, PlrScore::PartiallingOut),
            Err(DoubleMLError::IncompatibleLearner { .. })
        ));
        assert!(matches!(
            Irm::new(ols(), ols(), IrmScore::Ate),
            Err(DoubleMLError::IncompatibleLearner { .. })
        ));
    }

    #[test]
    fn test_results_require_fit() {
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let dml = DoubleML::new(plr_data(50, 0.5, 0), model, cfg(2, 1, 0)).unwrap();
        assert!(matches!(dml.coef(), Err(DoubleMLError::NotFitted(_))));
        assert!(dml.predictions("d", 0).is_err());
    }

    #[test]
    fn test_set_num_threads_rejects_zero() {
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let dml = DoubleML::new(plr_data(50, 0.5, 0), model, cfg(2, 1, 0)).unwrap();
        assert!(matches!(
            dml.set_num_threads(Some(0)),
            Err(DoubleMLError::InvalidConfiguration(..))
        ));

        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let dml = DoubleML::new(plr_data(50, 0.5, 0), model, cfg(2, 1, 0))
            .unwrap()
            .set_num_threads(Some(1))
            .unwrap();
        assert_eq!(dml.cfg().num_threads, Some(1));
    }

    #[test]
    fn test_external_sample_splitting() {
        let model = Plr::new(ols(), ols(), None, PlrScore::PartiallingOut).unwrap();
        let mut dml = DoubleML::new(plr_data(40, 0.5, 37), model, cfg(2, 1, 0)).unwrap();

        let wrong_size = SampleSplitting::new(vec![kfold_contiguous(30, 2)], 30).unwrap();
        assert!(matches!(
            dml.set_sample_splitting(wrong_size),
            Err(DoubleMLError::InvalidConfiguration(..))
        ));
        let overlapping = r#"{"n_obs":40,"folds":[[{"train":[0,1,2,3],"test":[0,1]},{"train":[0,1],"test":[0,1]}]]}"#;
        assert!(serde_json::from_str::<SampleSplitting>(overlapping).is_err());

        let smpls = SampleSplitting::new(vec![kfold_contiguous(40, 4), kfold_contiguous(40, 4)], 40).unwrap();
        dml.set_sample_splitting(smpls).unwrap();
        assert_eq!(dml.cfg().n_folds, 4);
        assert_eq!(dml.cfg().n_rep, 2);
        let est = dml.fit().unwrap();
        assert!(est.coef()[0].is_finite());
        assert_eq!(est.n_rep(), 2);
    }

    #[test]
    fn test_dummy_learner_fails_without_external_predictions() {
        let model = Plr::new(dummy(), dummy(), None, PlrScore::PartiallingOut).unwrap();
        let mut dml = DoubleML::new(plr_data(50, 0.5, 0), model, cfg(2, 1, 0)).unwrap();
        assert!(matches!(dml.fit(), Err(DoubleMLError::IncompatibleLearner { .. })));
    }
}
