use std::f64::consts;

use crate::constants::*;
use crate::geometry::*;
use crate::SourceError;

use super::WIDTH_FLOOR;

/// A focused Gaussian laser pulse.
///
/// The transverse intensity profile has rms width
///   sigma^2(z) = sigma_0^2 (1 + z^2 / z_R^2),
/// with sigma_0^2 = lambda z_R / (4 pi), where z is measured
/// from the focus along the direction of propagation and z_R
/// is the Rayleigh length.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LaserPulse {
    photon_energy: f64,
    pulse_energy: f64,
    length: f64,
    rayleigh_length: f64,
    frequency: f64,
    direction: Vec3,
    shift: Vec3,
    polarization: [f64; 3],
}

impl Default for LaserPulse {
    /// A 20 mJ, 1 ps pulse of 1.2 eV photons, counter-propagating
    /// to the default electron bunch.
    fn default() -> Self {
        LaserPulse {
            photon_energy: 1.2 * ELEMENTARY_CHARGE,
            pulse_energy: 0.02,
            length: 3.0e-4,
            rayleigh_length: 3.0e-3,
            frequency: 16.7e6,
            direction: Vec3::new(0.0, 0.0, -1.0),
            shift: Vec3::zero(),
            polarization: [0.0; 3],
        }
    }
}

impl LaserPulse {
    /// Sets the energy of a single laser photon, in joules.
    pub fn with_photon_energy(&self, photon_energy: f64) -> Self {
        LaserPulse {photon_energy, ..*self}
    }

    /// Sets the total pulse energy, in joules.
    pub fn with_pulse_energy(&self, pulse_energy: f64) -> Self {
        LaserPulse {pulse_energy, ..*self}
    }

    pub fn with_length(&self, length: f64) -> Self {
        LaserPulse {length, ..*self}
    }

    pub fn with_rayleigh_length(&self, rayleigh_length: f64) -> Self {
        LaserPulse {rayleigh_length, ..*self}
    }

    /// Sets the repetition rate of collisions, in Hz.
    pub fn with_frequency(&self, frequency: f64) -> Self {
        LaserPulse {frequency, ..*self}
    }

    pub fn with_shift(&self, shift: Vec3) -> Self {
        LaserPulse {shift, ..*self}
    }

    /// Sets the normalized Stokes parameters (xi_1, xi_2, xi_3) of
    /// the laser, in the transverse basis of the electron bunch.
    /// A vector of magnitude larger than one is rescaled to one.
    pub fn with_polarization(&self, xi: [f64; 3]) -> Self {
        LaserPulse {polarization: clamp_to_unit_ball(xi), ..*self}
    }

    pub fn with_direction(&self, direction: Vec3) -> Result<Self, SourceError> {
        let direction = direction.checked_normalize()
            .ok_or_else(|| SourceError::InvalidConfiguration("laser direction must have non-zero length".to_owned()))?;
        Ok(LaserPulse {direction, ..*self})
    }

    pub fn photon_energy(&self) -> f64 {
        self.photon_energy
    }

    pub fn pulse_energy(&self) -> f64 {
        self.pulse_energy
    }

    pub fn photon_number(&self) -> f64 {
        if self.photon_energy > 0.0 {
            self.pulse_energy / self.photon_energy
        } else {
            0.0
        }
    }

    pub fn wavelength(&self) -> f64 {
        PLANCK_CONSTANT * SPEED_OF_LIGHT / self.photon_energy
    }

    pub fn length(&self) -> f64 {
        self.length.max(WIDTH_FLOOR)
    }

    pub fn rayleigh_length(&self) -> f64 {
        self.rayleigh_length.max(WIDTH_FLOOR)
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn shift(&self) -> Vec3 {
        self.shift
    }

    pub fn polarization(&self) -> StokesVector {
        StokesVector::from_normalized(self.polarization)
    }

    /// Square of the rms transverse width at distance `z` from the focus.
    pub fn width2(&self, z: f64) -> f64 {
        let zr = self.rayleigh_length();
        let w0 = (self.wavelength() * zr / (4.0 * consts::PI)).max(WIDTH_FLOOR * WIDTH_FLOOR);
        w0 * (1.0 + (z / zr).powi(2))
    }

    pub fn width(&self, z: f64) -> f64 {
        self.width2(z).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_grows_by_sqrt2_over_rayleigh_length() {
        let laser = LaserPulse::default();
        let ratio = laser.width(laser.rayleigh_length()) / laser.width(0.0);
        println!("w(z_R) / w(0) = {}", ratio);
        assert!((ratio - 2.0f64.sqrt()).abs() < 1.0e-12);
    }

    #[test]
    fn photon_number() {
        let laser = LaserPulse::default()
            .with_photon_energy(1.0 * ELEMENTARY_CHARGE)
            .with_pulse_energy(ELEMENTARY_CHARGE * 1.0e6);
        assert!((laser.photon_number() - 1.0e6).abs() < 1.0e-3);
    }

    #[test]
    fn polarization_is_clamped() {
        let laser = LaserPulse::default().with_polarization([2.0, 0.0, 0.0]);
        assert_eq!(laser.polarization(), StokesVector::new(1.0, 1.0, 0.0, 0.0));
    }
}
