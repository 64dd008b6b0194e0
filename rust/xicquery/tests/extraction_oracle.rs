use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use xicquery::models::tolerance::{
    MobilityTolerance,
    MzTolerance,
};
use xicquery::{
    find_first_match,
    find_maximum,
    ScanIndex,
    Tolerance,
};

fn random_scan(rng: &mut ChaCha8Rng, len: usize) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let mut mz: Vec<f32> = (0..len)
        // Coarse grid so duplicate m/z runs are common
        .map(|_| 400.0 + (rng.gen_range(0..200) as f32) * 0.5)
        .collect();
    mz.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mobility = (0..len).map(|_| rng.gen_range(0.6f32..1.4)).collect();
    let intensity = (0..len).map(|_| rng.gen_range(1.0f32..1e5)).collect();
    (mz, mobility, intensity)
}

// Test: a window covering the whole scan returns the true most intense peak
#[test]
fn test_whole_scan_window_returns_global_maximum() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let tol = Tolerance {
        ms: MzTolerance::Absolute((1000.0, 1000.0)),
        mobility: MobilityTolerance::Unrestricted,
    };

    for trial in 0..200 {
        let len = rng.gen_range(1..300);
        let (mz, mobility, intensity) = random_scan(&mut rng, len);
        let index = ScanIndex::from_scans(vec![(1.0, mz.clone(), mobility, intensity.clone())]).unwrap();
        index.check_sorted().unwrap();

        let best = find_maximum(&index.scan(0), tol.mz_range(450.0), &tol.mobility_range(1.0));

        let oracle = intensity
            .iter()
            .copied()
            .fold(0.0f32, f32::max);
        assert_eq!(best.intensity, oracle, "trial {}", trial);
        let first_at_max = intensity.iter().position(|&x| x == oracle).unwrap();
        assert_eq!(best.mz, mz[first_at_max], "trial {}", trial);
    }
}

// Test: narrow windows agree with a brute-force scan of the peaks
#[test]
fn test_narrow_windows_match_brute_force() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let tol = Tolerance {
        ms: MzTolerance::Ppm((800.0, 800.0)),
        mobility: MobilityTolerance::Absolute((0.1, 0.1)),
    };

    for _ in 0..100 {
        let len = rng.gen_range(1..200);
        let (mz, mobility, intensity) = random_scan(&mut rng, len);
        let index =
            ScanIndex::from_scans(vec![(1.0, mz.clone(), mobility.clone(), intensity.clone())])
                .unwrap();
        let scan = index.scan(0);

        for _ in 0..50 {
            let target = rng.gen_range(395.0f64..505.0);
            let target_im = rng.gen_range(0.6f64..1.4);
            let mz_range = tol.mz_range(target);
            let im_range = tol.mobility_range(target_im);

            let mut oracle = 0.0f32;
            for i in 0..len {
                let x = mz[i] as f64;
                if mz_range.contains(x) && im_range.admits(mobility[i] as f64) && intensity[i] > oracle {
                    oracle = intensity[i];
                }
            }

            let best = find_maximum(&scan, mz_range, &im_range);
            assert_eq!(best.intensity, oracle);
            if oracle == 0.0 {
                assert!(best.is_missing());
            }

            if let Some(first) = mz.iter().position(|&x| mz_range.contains(x as f64)) {
                let located = find_first_match(&mz, mz_range.start(), mz_range.end());
                assert_eq!(located, first);
            }
        }
    }
}
