//! Constant-velocity Kalman filter on a 2-D centroid.
//!
//! State: `[px, py, vx, vy]` in pixels and pixels per frame.
//! Observation: `[px, py]`.

type Mat4 = [[f64; 4]; 4];
type Vec4 = [f64; 4];

/// Initial velocity variance: nothing is known about motion at birth.
const INITIAL_VELOCITY_VARIANCE: f64 = 100.0;

#[derive(Clone, Debug)]
pub struct KalmanFilter {
    x: Vec4,
    p: Mat4,
    /// Acceleration noise variance (white-noise acceleration model).
    process_noise: f64,
    /// Centroid measurement variance, per axis.
    measurement_noise: f64,
}

impl KalmanFilter {
    pub fn new(position: (f32, f32), process_noise: f32, measurement_noise: f32) -> Self {
        let measurement_noise = measurement_noise as f64;
        let mut p = [[0.0f64; 4]; 4];
        p[0][0] = measurement_noise;
        p[1][1] = measurement_noise;
        p[2][2] = INITIAL_VELOCITY_VARIANCE;
        p[3][3] = INITIAL_VELOCITY_VARIANCE;
        Self {
            x: [position.0 as f64, position.1 as f64, 0.0, 0.0],
            p,
            process_noise: process_noise as f64,
            measurement_noise,
        }
    }

    /// Propagate `dt` frames ahead: `x = F x`, `P = F P F' + Q`.
    pub fn predict(&mut self, dt: f64) {
        self.x[0] += dt * self.x[2];
        self.x[1] += dt * self.x[3];

        let mut f = identity();
        f[0][2] = dt;
        f[1][3] = dt;
        let fp = mul(&f, &self.p);
        let mut p = mul(&fp, &transpose(&f));

        // Per-axis Q = q * [[dt^4/4, dt^3/2], [dt^3/2, dt^2]].
        let q = self.process_noise;
        let (dt2, dt3, dt4) = (dt * dt, dt * dt * dt, dt * dt * dt * dt);
        for axis in 0..2 {
            let (pos, vel) = (axis, axis + 2);
            p[pos][pos] += q * dt4 / 4.0;
            p[pos][vel] += q * dt3 / 2.0;
            p[vel][pos] += q * dt3 / 2.0;
            p[vel][vel] += q * dt2;
        }
        self.p = p;
    }

    /// Correct with an observed centroid.
    pub fn update(&mut self, observation: (f32, f32)) {
        let y = [
            observation.0 as f64 - self.x[0],
            observation.1 as f64 - self.x[1],
        ];

        // S = H P H' + R: top-left 2x2 of P plus measurement noise.
        let s = [
            [self.p[0][0] + self.measurement_noise, self.p[0][1]],
            [self.p[1][0], self.p[1][1] + self.measurement_noise],
        ];
        let det = s[0][0] * s[1][1] - s[0][1] * s[1][0];
        if det.abs() < f64::EPSILON {
            return;
        }
        let s_inv = [
            [s[1][1] / det, -s[0][1] / det],
            [-s[1][0] / det, s[0][0] / det],
        ];

        // K = P H' S^-1 (4x2); P H' is the first two columns of P.
        let mut k = [[0.0f64; 2]; 4];
        for (i, row) in k.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.p[i][0] * s_inv[0][j] + self.p[i][1] * s_inv[1][j];
            }
        }

        for i in 0..4 {
            self.x[i] += k[i][0] * y[0] + k[i][1] * y[1];
        }

        // P = (I - K H) P
        let mut ikh = identity();
        for i in 0..4 {
            ikh[i][0] -= k[i][0];
            ikh[i][1] -= k[i][1];
        }
        self.p = mul(&ikh, &self.p);
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x[0] as f32, self.x[1] as f32)
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.x[2] as f32, self.x[3] as f32)
    }
}

fn identity() -> Mat4 {
    let mut m = [[0.0f64; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

fn transpose(m: &Mat4) -> Mat4 {
    let mut t = [[0.0f64; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            t[j][i] = m[i][j];
        }
    }
    t
}

fn mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0f64; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[i][j] = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learns_constant_velocity() {
        let mut kf = KalmanFilter::new((0.0, 10.0), 1.0, 4.0);
        for step in 1..=20 {
            kf.predict(1.0);
            kf.update((3.0 * step as f32, 10.0));
        }
        let (vx, vy) = kf.velocity();
        assert!((vx - 3.0).abs() < 0.2, "vx = {}", vx);
        assert!(vy.abs() < 0.1);

        kf.predict(1.0);
        let (px, _) = kf.position();
        assert!((px - 63.0).abs() < 1.0, "px = {}", px);
    }

    #[test]
    fn prediction_without_update_extrapolates() {
        let mut kf = KalmanFilter::new((0.0, 0.0), 1.0, 4.0);
        for step in 1..=10 {
            kf.predict(1.0);
            kf.update((2.0 * step as f32, -(step as f32)));
        }
        let before = kf.position();
        kf.predict(2.0);
        let after = kf.position();
        assert!((after.0 - before.0 - 4.0).abs() < 0.5);
        assert!((after.1 - before.1 + 2.0).abs() < 0.5);
    }

    #[test]
    fn stationary_target_has_no_velocity() {
        let mut kf = KalmanFilter::new((5.0, 5.0), 1.0, 4.0);
        for _ in 0..10 {
            kf.predict(1.0);
            kf.update((5.0, 5.0));
        }
        assert_eq!(kf.position(), (5.0, 5.0));
        assert_eq!(kf.velocity(), (0.0, 0.0));
    }
}
