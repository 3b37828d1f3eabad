//! WGSL source for the transform kernel library.
//!
//! One module, seven entry points, one shared bind group:
//! `src` (sampled RGBA8), `dst` (write-only storage RGBA8),
//! `bilinear` (clamp-to-edge linear sampler), `params` (packed extras).
//!
//! Coordinates are continuous with texel `i` centred on `i + 0.5`.

/// Workgroup edge, must match `@workgroup_size` below.
pub(crate) const WORKGROUP_SIZE: u32 = 16;

/// Entry-point library compiled once per environment.
pub(crate) const TRANSFORM_KERNELS: &str = r#"
struct Params {
    lo: vec4<f32>,
    hi: vec4<f32>,
}

@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var bilinear: sampler;
@group(0) @binding(3) var<uniform> params: Params;

fn src_size() -> vec2<f32> {
    return vec2<f32>(textureDimensions(src));
}

fn in_bounds(id: vec3<u32>) -> bool {
    let size = textureDimensions(dst);
    return id.x < size.x && id.y < size.y;
}

fn pixel_center(id: vec3<u32>) -> vec2<f32> {
    return vec2<f32>(id.xy) + vec2<f32>(0.5, 0.5);
}

fn sample_linear(q: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(src, bilinear, q / src_size(), 0.0);
}

fn load_nearest(q: vec2<i32>) -> vec4<f32> {
    let last = vec2<i32>(textureDimensions(src)) - vec2<i32>(1, 1);
    return textureLoad(src, clamp(q, vec2<i32>(0, 0), last), 0);
}

fn write_pixel(id: vec3<u32>, pixel: vec4<f32>) {
    textureStore(dst, vec2<i32>(id.xy), pixel);
}

// lo.xy = (1/fx, 1/fy)
@compute @workgroup_size(16, 16)
fn image_recscale(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_bounds(id) { return; }
    let q = pixel_center(id) * params.lo.xy;
    write_pixel(id, sample_linear(q));
}

// lo.xy = (sin, cos), inverse rotation about the image centre
@compute @workgroup_size(16, 16)
fn image_rotate(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_bounds(id) { return; }
    let s = params.lo.x;
    let c = params.lo.y;
    let o = src_size() * 0.5;
    let d = pixel_center(id) - o;
    let q = vec2<f32>(c * d.x + s * d.y, c * d.y - s * d.x) + o;
    write_pixel(id, sample_linear(q));
}

@compute @workgroup_size(16, 16)
fn image_flip_h(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_bounds(id) { return; }
    let size = vec2<i32>(textureDimensions(src));
    let p = vec2<i32>(id.xy);
    write_pixel(id, load_nearest(vec2<i32>(size.x - 1 - p.x, p.y)));
}

@compute @workgroup_size(16, 16)
fn image_flip_v(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_bounds(id) { return; }
    let size = vec2<i32>(textureDimensions(src));
    let p = vec2<i32>(id.xy);
    write_pixel(id, load_nearest(vec2<i32>(p.x, size.y - 1 - p.y)));
}

@compute @workgroup_size(16, 16)
fn image_flip_hv(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_bounds(id) { return; }
    let size = vec2<i32>(textureDimensions(src));
    let p = vec2<i32>(id.xy);
    write_pixel(id, load_nearest(size - vec2<i32>(1, 1) - p));
}

// q = A.p, lo = (Ax, Ay)
@compute @workgroup_size(16, 16)
fn image_affine(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_bounds(id) { return; }
    let p = pixel_center(id);
    let q = vec2<f32>(dot(params.lo.xy, p), dot(params.lo.zw, p));
    write_pixel(id, sample_linear(q));
}

// q - q0 = A.(p - p0), lo = (Ax, Ay), hi = (q0, p0)
@compute @workgroup_size(16, 16)
fn image_affine2(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_bounds(id) { return; }
    let p = pixel_center(id) - params.hi.zw;
    let q = vec2<f32>(dot(params.lo.xy, p), dot(params.lo.zw, p)) + params.hi.xy;
    write_pixel(id, sample_linear(q));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KERNELS;

    #[test]
    fn test_every_kernel_has_entry_point() {
        for kernel in &KERNELS {
            let decl = format!("fn {}(", kernel.name);
            assert_eq!(TRANSFORM_KERNELS.matches(&decl).count(), 1, "{}", kernel.name);
        }
    }

    #[test]
    fn test_workgroup_size_matches_source() {
        let decl = format!("@workgroup_size({0}, {0})", WORKGROUP_SIZE);
        assert_eq!(TRANSFORM_KERNELS.matches(&decl).count(), KERNELS.len());
    }

    #[test]
    fn test_kernel_filtering_matches_signature() {
        for kernel in &KERNELS {
            let start = TRANSFORM_KERNELS
                .find(&format!("fn {}(", kernel.name))
                .unwrap();
            let body = &TRANSFORM_KERNELS[start..];
            let body = &body[..body.find("\n}").unwrap()];
            assert_eq!(body.contains("load_nearest("), kernel.nearest, "{}", kernel.name);
            assert_eq!(body.contains("sample_linear("), !kernel.nearest, "{}", kernel.name);
        }
    }
}
