//! Shared fixtures and end-to-end checks over a 7x7 masked dataset

pub use crate::prelude::*;

pub use approx::assert_relative_eq;
pub use ndarray::{Array1, Array2};
pub use rand::prelude::*;
pub use rand_distr::Distribution;

pub fn psf_3x3() -> Psf {
    Psf::new(ndarray::array![
        [0.0, 0.1, 0.0],
        [0.1, 0.6, 0.1],
        [0.0, 0.1, 0.0]
    ])
    .unwrap()
    .normalized()
}

pub fn mask_7x7() -> Mask2D {
    Mask2D::circular((7, 7), 1.0, 2.5)
}

pub fn sersic_galaxy() -> Galaxy {
    Galaxy::new(0.5).with_light_profile(Sersic::new(
        (0.0, 0.0),
        EllipticalComponents::spherical(),
        1.0,
        1.0,
        2.0,
    ))
}

/// Native image of the blurred galaxy on the 7x7 circular mask
pub fn blurred_image_native_of(galaxy: &Galaxy) -> Array2<f64> {
    let mask = mask_7x7();
    let psf = psf_3x3();
    let grid = Grid2D::from_mask(&mask, 2);
    let blurring_grid = Grid2D::blurring_grid_from(&mask, psf.shape());
    let convolver = Convolver::new(&mask, &psf);
    let sub_image = galaxy.image_from(&grid).unwrap();
    let blurring_image = galaxy.image_from(&blurring_grid).unwrap();
    let blurred = convolver.convolve(&grid.bin(&sub_image), &blurring_image);

    let mut image_native = Array2::zeros((7, 7));
    for (s, (i, j)) in mask.native_index_for_slim().into_iter().enumerate() {
        image_native[(i, j)] = blurred[s];
    }
    image_native
}

/// A 7x7 dataset whose image is the blurred galaxy plus nothing else, so
/// fitting that same galaxy is a perfect fit
pub fn imaging_7x7_of(galaxy: &Galaxy, noise: f64) -> Imaging {
    Imaging::new(
        &blurred_image_native_of(galaxy),
        &Array2::from_elem((7, 7), noise),
        psf_3x3(),
        mask_7x7(),
        2,
    )
}

#[test]
fn perfect_profile_fit_has_zero_chi_squared() {
    let galaxy = sersic_galaxy();
    let dataset = imaging_7x7_of(&galaxy, 1.0);
    let plane = Plane::new(0.5, vec![galaxy]);
    let fit = FitImaging::new(
        &dataset,
        &plane,
        None,
        None,
        false,
        &SettingsInversion::default(),
    )
    .unwrap();
    assert!(fit.chi_squared() < 1e-16);
    assert_relative_eq!(
        fit.log_likelihood(),
        -0.5 * fit.noise_normalization(),
        max_relative = 1e-10
    );
}

#[test]
fn wrong_galaxy_scores_worse_than_the_true_one() {
    let truth = sersic_galaxy();
    let dataset = imaging_7x7_of(&truth, 0.1);
    let settings = SettingsInversion::default();

    let good = score(
        &dataset,
        &Plane::new(0.5, vec![truth]),
        None,
        None,
        false,
        &settings,
    )
    .unwrap();
    let wrong = Galaxy::new(0.5).with_light_profile(Sersic::new(
        (0.0, 0.0),
        EllipticalComponents::spherical(),
        2.0,
        1.5,
        2.0,
    ));
    let bad = score(
        &dataset,
        &Plane::new(0.5, vec![wrong]),
        None,
        None,
        false,
        &settings,
    )
    .unwrap();
    assert!(good > bad);
}

#[test]
fn profile_plus_inversion_fit_improves_on_profile_alone() {
    // dataset holds two galaxies but the model only carries one; the
    // inversion absorbs most of what the missing profile leaves behind
    let primary = sersic_galaxy();
    let secondary = Galaxy::new(0.5).with_light_profile(Exponential::new(
        (0.5, 0.5),
        EllipticalComponents::spherical(),
        0.5,
        1.0,
    ));
    let both = Galaxy::new(0.5)
        .with_light_profile(primary.light_profiles[0].clone())
        .with_light_profile(secondary.light_profiles[0].clone());
    let dataset = imaging_7x7_of(&both, 0.1);
    let settings = SettingsInversion::default();

    let profile_only = FitImaging::new(
        &dataset,
        &Plane::new(0.5, vec![primary.clone()]),
        None,
        None,
        false,
        &settings,
    )
    .unwrap();

    let inversion_galaxy = Galaxy::new(0.5).with_pixelization(
        Rectangular::new((7, 7)),
        Regularization::Constant(Constant::new(0.01)),
    );
    let with_inversion = FitImaging::new(
        &dataset,
        &Plane::new(0.5, vec![primary, inversion_galaxy]),
        None,
        None,
        false,
        &settings,
    )
    .unwrap();

    assert!(with_inversion.chi_squared() < profile_only.chi_squared());
    assert!(with_inversion.inversion().is_some());
}

#[test]
fn noisy_data_scores_close_to_the_expected_chi_squared() {
    let galaxy = sersic_galaxy();
    let noise = 0.05;

    // perturb each pixel by its noise level; chi-squared per pixel is then
    // unit on average
    let mut rng = StdRng::seed_from_u64(0);
    let normal = rand_distr::Normal::new(0.0, noise).unwrap();
    let image_native = blurred_image_native_of(&galaxy).mapv(|v| v + normal.sample(&mut rng));
    let dataset = Imaging::new(
        &image_native,
        &Array2::from_elem((7, 7), noise),
        psf_3x3(),
        mask_7x7(),
        2,
    );

    let fit = FitImaging::new(
        &dataset,
        &Plane::new(0.5, vec![galaxy]),
        None,
        None,
        false,
        &SettingsInversion::default(),
    )
    .unwrap();
    let reduced = fit.chi_squared() / dataset.pixels() as f64;
    assert!(reduced > 0.3 && reduced < 3.0, "reduced chi2 {reduced}");
}

#[test]
fn hyper_scalings_lower_chi_squared_on_a_bad_fit() {
    let truth = sersic_galaxy();
    let dataset = imaging_7x7_of(&truth, 0.5);
    let pixels = dataset.pixels();
    let hyper_image = Array1::ones(pixels);
    let wrong = Galaxy::new(0.5)
        .with_light_profile(Sersic::new(
            (0.0, 0.0),
            EllipticalComponents::spherical(),
            1.4,
            1.0,
            2.0,
        ))
        .with_hyper_galaxy(
            HyperGalaxy::new(0.0, 2.0, 1.0),
            hyper_image.clone(),
            hyper_image,
        );
    let plane = Plane::new(0.5, vec![wrong]);
    let settings = SettingsInversion::default();

    let raw = FitImaging::new(&dataset, &plane, None, None, false, &settings).unwrap();
    let scaled = FitImaging::new(&dataset, &plane, None, None, true, &settings).unwrap();

    // scaled noise is 0.5 + 2 * 0.5 = 1.5 everywhere
    for n in scaled.noise_map().iter() {
        assert_relative_eq!(*n, 1.5, max_relative = 1e-12);
    }
    assert!(scaled.chi_squared() < raw.chi_squared());
    // the bypass restores the raw dataset exactly
    for (a, b) in raw.noise_map().iter().zip(dataset.noise_map().iter()) {
        assert_relative_eq!(a, b, max_relative = 1e-15);
    }
}
