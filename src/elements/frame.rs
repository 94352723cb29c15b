//! Local-frame kinematics and stiffness of two-node 3D frame members
//!
//! Local dof order at each end is `[ux, uy, uz, rx, ry, rz]`, end i first.

use nalgebra::{Matrix3, Matrix4, SMatrix, SVector, Vector3};

use super::{Material, Section};
use crate::error::{AnalysisError, AnalysisResult};

pub type Mat12 = SMatrix<f64, 12, 12>;
pub type Vec12 = SVector<f64, 12>;

const TOL: f64 = 1e-10;

/// Flexure dofs `[v_i, theta_i, v_j, theta_j]` bending in the local x-y plane
const XY_PLANE: [usize; 4] = [1, 5, 7, 11];
/// Flexure dofs bending in the local x-z plane, where rotations oppose `uz`
const XZ_PLANE: [usize; 4] = [2, 4, 8, 10];

/// Member axis unit vector and length
fn axis(i: &[f64; 3], j: &[f64; 3]) -> AnalysisResult<(Vector3<f64>, f64)> {
    let d = Vector3::new(j[0] - i[0], j[1] - i[1], j[2] - i[2]);
    let length = d.norm();
    if length < TOL {
        return Err(AnalysisError::InvalidInput("frame member has zero length".to_string()));
    }
    Ok((d / length, length))
}

/// Local y and z before the roll angle is applied
///
/// Members along global Y take local y on -X (pointing up) or +X (pointing
/// down) and z on global Z. Members in the X-Z plane take local y on global
/// Y. Anything else keeps local z horizontal.
fn default_axes(x: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    if x[0].abs() < TOL && x[2].abs() < TOL {
        let y = Vector3::new(-x[1].signum(), 0.0, 0.0);
        return (y, Vector3::z());
    }
    if x[1].abs() < TOL {
        let y = Vector3::y();
        return (y, x.cross(&y).normalize());
    }
    let horizontal = Vector3::new(x[0], 0.0, x[2]);
    let z = if x[1] > 0.0 {
        horizontal.cross(x)
    } else {
        x.cross(&horizontal)
    }
    .normalize();
    (z.cross(x).normalize(), z)
}

/// Direction cosines of the local axes, one per row
pub fn rotation(i: &[f64; 3], j: &[f64; 3], roll: f64) -> AnalysisResult<Matrix3<f64>> {
    let (x, _) = axis(i, j)?;
    let (mut y, mut z) = default_axes(&x);
    if roll.abs() > TOL {
        let (s, c) = roll.sin_cos();
        (y, z) = (y * c + z * s, z * c - y * s);
    }
    Ok(Matrix3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]))
}

/// Block-diagonal global-to-local transformation of both end nodes
pub fn transformation(i: &[f64; 3], j: &[f64; 3], roll: f64) -> AnalysisResult<Mat12> {
    let r = rotation(i, j, roll)?;
    let mut t = Mat12::zeros();
    for block in 0..4 {
        t.fixed_view_mut::<3, 3>(3 * block, 3 * block).copy_from(&r);
    }
    Ok(t)
}

/// Add a two-node bar term `value * [[1, -1], [-1, 1]]` on local dof `d`
fn add_bar(k: &mut Mat12, d: usize, value: f64) {
    k[(d, d)] += value;
    k[(d + 6, d + 6)] += value;
    k[(d, d + 6)] -= value;
    k[(d + 6, d)] -= value;
}

/// Scatter a 4x4 flexure block. In the x-z plane rotation rows and columns
/// change sign.
fn add_flexure(k: &mut Mat12, dofs: [usize; 4], block: &Matrix4<f64>) {
    let sign = |a: usize| if dofs == XZ_PLANE && a % 2 == 1 { -1.0 } else { 1.0 };
    for a in 0..4 {
        for b in 0..4 {
            k[(dofs[a], dofs[b])] += sign(a) * sign(b) * block[(a, b)];
        }
    }
}

/// Euler-Bernoulli bending block for `[v_i, theta_i, v_j, theta_j]`
fn bending_block(ei: f64, l: f64) -> Matrix4<f64> {
    let (a, b, c, d) = (12.0 * ei / l.powi(3), 6.0 * ei / l.powi(2), 4.0 * ei / l, 2.0 * ei / l);
    #[rustfmt::skip]
    let block = Matrix4::new(
         a,  b, -a,  b,
         b,  c, -b,  d,
        -a, -b,  a, -b,
         b,  d, -b,  c,
    );
    block
}

/// Consistent geometric block of an axial force `n` for the same dofs
fn geometric_block(n: f64, l: f64) -> Matrix4<f64> {
    let (a, b, c, d) = (1.2 * n / l, 0.1 * n, 2.0 * n * l / 15.0, n * l / 30.0);
    #[rustfmt::skip]
    let block = Matrix4::new(
         a,  b, -a,  b,
         b,  c, -b, -d,
        -a, -b,  a, -b,
         b, -d, -b,  c,
    );
    block
}

/// Linear elastic stiffness in local coordinates
pub fn elastic_stiffness(material: &Material, section: &Section, length: f64) -> Mat12 {
    let mut k = Mat12::zeros();
    add_bar(&mut k, 0, material.e * section.a / length);
    add_bar(&mut k, 3, material.g * section.j / length);
    add_flexure(&mut k, XY_PLANE, &bending_block(material.e * section.iz, length));
    add_flexure(&mut k, XZ_PLANE, &bending_block(material.e * section.iy, length));
    k
}

/// Geometric stiffness of axial force `n`, tension positive
pub fn geometric_stiffness(n: f64, section: &Section, length: f64) -> Mat12 {
    let mut k = Mat12::zeros();
    if n.abs() < TOL {
        return k;
    }
    add_bar(&mut k, 0, n / length);
    add_bar(&mut k, 3, n / length * (section.iy + section.iz) / section.a);
    let block = geometric_block(n, length);
    add_flexure(&mut k, XY_PLANE, &block);
    add_flexure(&mut k, XZ_PLANE, &block);
    k
}
