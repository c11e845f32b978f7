// renderer/snippets.rs - shader fragments spliced into pipeline programs
use std::sync::Arc;

/// Alpha at or above this is drawn by the unblended pass, anything in
/// (0, OPAQUE_THRESHOLD) by the blended pass.
pub const OPAQUE_THRESHOLD: f32 = 0.9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnippetHook {
    /// Before projection; may rewrite `pos`.
    VertexTransform,
    /// After projection; fills `out` varyings.
    Vertex,
    /// After layer combining; rewrites `color`.
    Fragment,
}

/// A piece of WGSL injected at a hook point.
///
/// Vertex hooks see `vin`, `out`, `pos` and `object_pos`; fragment hooks see
/// `v` and `color`. Every snippet body gets its own block scope.
#[derive(Debug)]
pub struct Snippet {
    pub name: &'static str,
    pub hook: SnippetHook,
    /// Module-scope items (helper functions).
    pub declarations: &'static str,
    pub body: &'static str,
}

pub type SharedSnippet = Arc<Snippet>;

fn snippet(
    name: &'static str,
    hook: SnippetHook,
    declarations: &'static str,
    body: &'static str,
) -> SharedSnippet {
    Arc::new(Snippet {
        name,
        hook,
        declarations,
        body,
    })
}

/// Every snippet the renderer uses, created once.
///
/// Programs are cached by snippet identity, not source text, so pipelines
/// must always be assembled from these instances.
#[derive(Debug)]
pub struct SnippetLibrary {
    pub cache_position: SharedSnippet,
    pub lighting_vertex: SharedSnippet,
    pub normal_map_vertex: SharedSnippet,
    pub shadow_vertex: SharedSnippet,
    pub pointalism_vertex: SharedSnippet,
    pub dof_blur_vertex: SharedSnippet,
    pub diamond_circle: SharedSnippet,
    pub alpha_mask: SharedSnippet,
    pub blended_discard: SharedSnippet,
    pub unblended_discard: SharedSnippet,
    pub unpremultiply: SharedSnippet,
    pub premultiply: SharedSnippet,
    pub normal_map_lighting: SharedSnippet,
    pub material_lighting: SharedSnippet,
    pub simple_lighting: SharedSnippet,
    pub shadow_fragment: SharedSnippet,
    pub dof_blur_fragment: SharedSnippet,
    pub dof_unshaped_fragment: SharedSnippet,
    pub dof_diamond_fragment: SharedSnippet,
}

impl SnippetLibrary {
    pub fn new() -> Self {
        use SnippetHook::*;

        Self {
            cache_position: snippet("cache-position", VertexTransform, "", "object_pos = pos;"),
            lighting_vertex: snippet(
                "lighting-vertex",
                Vertex,
                "",
                r#"
    out.normal = normalize((u.normal_matrix * vec4<f32>(vin.normal, 0.0)).xyz);
    out.eye_direction = -(u.modelview * object_pos).xyz;"#,
            ),
            normal_map_vertex: snippet(
                "normal-map-vertex",
                Vertex,
                "",
                r#"
    let tangent = normalize((u.normal_matrix * vec4<f32>(vin.tangent.xyz, 0.0)).xyz);
    let binormal = cross(out.normal, tangent) * vin.tangent.w;
    let l = u.light_direction.xyz;
    out.light_direction = normalize(vec3<f32>(dot(l, tangent), dot(l, binormal), dot(l, out.normal)));
    let e = out.eye_direction;
    out.eye_direction = normalize(vec3<f32>(dot(e, tangent), dot(e, binormal), dot(e, out.normal)));"#,
            ),
            shadow_vertex: snippet(
                "shadow-vertex",
                Vertex,
                "",
                "out.shadow_coords = u.light_shadow_matrix * object_pos;",
            ),
            pointalism_vertex: snippet(
                "pointalism-vertex",
                VertexTransform,
                r#"
fn pointalism_luminance(c: vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.299, 0.587, 0.114));
}"#,
                r#"
    let cell = textureSampleLevel(layer1, layer_sampler, vin.uv, 0.0);
    var lum = pointalism_luminance(cell.rgb);
    if (u.pointalism.z < 0.5) {
        lum = 1.0 - lum;
    }
    let centre = vec2<f32>(vin.uv.x - 0.5, 0.5 - vin.uv.y);
    let corner = pos.xy - centre;
    let extent = max(max(abs(corner.x), abs(corner.y)), 1e-6);
    let dot_corner = corner / extent * (0.5 * u.pointalism.w);
    pos = vec4<f32>(centre + dot_corner * lum * u.pointalism.x, -lum * u.pointalism.y, 1.0);"#,
            ),
            dof_blur_vertex: snippet(
                "dof-blur-vertex",
                Vertex,
                "",
                r#"
    let view_pos = u.modelview * object_pos;
    out.dof_blur = 1.0 - clamp(abs(view_pos.z - u.params.z) / u.params.w, 0.0, 1.0);"#,
            ),
            diamond_circle: snippet(
                "diamond-circle",
                Fragment,
                "",
                r#"
    let d = length(v.uv - vec2<f32>(0.5, 0.5));
    color = vec4<f32>(color.rgb, color.a * step(d, 0.5));"#,
            ),
            alpha_mask: snippet(
                "alpha-mask",
                Fragment,
                "",
                r#"
    if (textureSampleLevel(layer4, layer_sampler, v.uv, 0.0).r < u.params.y) {
        discard;
    }"#,
            ),
            blended_discard: snippet(
                "blended-discard",
                Fragment,
                "",
                r#"
    if (color.a <= 0.0 || color.a >= OPAQUE_THRESHOLD) {
        discard;
    }"#,
            ),
            unblended_discard: snippet(
                "unblended-discard",
                Fragment,
                "",
                r#"
    if (color.a < OPAQUE_THRESHOLD) {
        discard;
    }"#,
            ),
            unpremultiply: snippet(
                "unpremultiply",
                Fragment,
                "",
                r#"
    if (color.a > 0.0) {
        color = vec4<f32>(color.rgb / color.a, color.a);
    }"#,
            ),
            premultiply: snippet(
                "premultiply",
                Fragment,
                "",
                "color = vec4<f32>(color.rgb * color.a, color.a);",
            ),
            normal_map_lighting: snippet(
                "normal-map-lighting",
                Fragment,
                "",
                r#"
    let l = normalize(v.light_direction);
    let n = normalize(textureSampleLevel(layer7, layer_sampler, v.uv, 0.0).rgb * 2.0 - 1.0);
    var lit = u.light_ambient * u.material_ambient * color;
    let lambert = dot(n, l);
    if (lambert > 0.0) {
        lit += color * u.light_diffuse * u.material_diffuse * lambert;
        let r = reflect(-l, n);
        let e = normalize(v.eye_direction);
        lit += u.light_specular * u.material_specular * pow(max(dot(r, e), 0.0), u.params.x);
    }
    color = vec4<f32>(lit.rgb, color.a);"#,
            ),
            material_lighting: snippet(
                "material-lighting",
                Fragment,
                "",
                r#"
    let l = u.light_direction.xyz;
    let n = normalize(v.normal);
    var lit = u.light_ambient * u.material_ambient * color;
    let lambert = dot(n, l);
    if (lambert > 0.0) {
        lit += color * u.light_diffuse * u.material_diffuse * lambert;
        let r = reflect(-l, n);
        let e = normalize(v.eye_direction);
        lit += u.light_specular * u.material_specular * pow(max(dot(r, e), 0.0), u.params.x);
    }
    color = vec4<f32>(lit.rgb, color.a);"#,
            ),
            simple_lighting: snippet(
                "simple-lighting",
                Fragment,
                "",
                r#"
    let l = u.light_direction.xyz;
    let n = normalize(v.normal);
    var lit = u.light_ambient * color;
    let lambert = dot(n, l);
    if (lambert > 0.0) {
        lit += color * u.light_diffuse * lambert;
        let r = reflect(-l, n);
        let e = normalize(v.eye_direction);
        lit += u.light_specular * vec4<f32>(0.6, 0.6, 0.6, 1.0) * pow(max(dot(r, e), 0.0), 2.0);
    }
    color = vec4<f32>(lit.rgb, color.a);"#,
            ),
            shadow_fragment: snippet(
                "shadow-fragment",
                Fragment,
                "",
                r#"
    if (u.light_direction.w > 0.5) {
        let coords = v.shadow_coords.xyz / v.shadow_coords.w;
        let stored = textureSampleLevel(layer10, shadow_sampler, coords.xy, 0);
        if (stored + 0.0005 < coords.z) {
            color = vec4<f32>(color.rgb * 0.5, color.a);
        }
    }"#,
            ),
            dof_blur_fragment: snippet(
                "dof-blur-fragment",
                Fragment,
                "",
                "color = vec4<f32>(color.rgb, v.dof_blur);",
            ),
            dof_unshaped_fragment: snippet(
                "dof-unshaped-fragment",
                Fragment,
                "",
                r#"
    if (color.a < 0.25) {
        discard;
    }
    color = vec4<f32>(color.rgb, v.dof_blur);"#,
            ),
            dof_diamond_fragment: snippet(
                "dof-diamond-fragment",
                Fragment,
                "",
                r#"
    if (color.a <= 0.0) {
        discard;
    }
    color = vec4<f32>(color.rgb, v.dof_blur);"#,
            ),
        }
    }
}

impl Default for SnippetLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Which of the two colour passes draws a fragment of the given alpha.
pub fn drawn_by_unblended(alpha: f32) -> bool {
    alpha >= OPAQUE_THRESHOLD
}

pub fn drawn_by_blended(alpha: f32) -> bool {
    alpha > 0.0 && alpha < OPAQUE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_passes_partition_alpha() {
        let samples = [
            0.0,
            1e-6,
            0.25,
            0.5,
            OPAQUE_THRESHOLD - 1e-4,
            OPAQUE_THRESHOLD,
            1.0,
        ];
        for alpha in samples {
            let both = drawn_by_unblended(alpha) && drawn_by_blended(alpha);
            assert!(!both, "alpha {alpha} drawn twice");
            if alpha > 0.0 {
                assert!(
                    drawn_by_unblended(alpha) || drawn_by_blended(alpha),
                    "alpha {alpha} dropped"
                );
            }
        }
    }

    #[test]
    fn threshold_itself_is_opaque() {
        assert!(drawn_by_unblended(OPAQUE_THRESHOLD));
        assert!(!drawn_by_blended(OPAQUE_THRESHOLD));
    }

    #[test]
    fn discard_snippets_use_matching_comparisons() {
        let lib = SnippetLibrary::new();
        assert!(lib.unblended_discard.body.contains("color.a < OPAQUE_THRESHOLD"));
        assert!(lib.blended_discard.body.contains("color.a >= OPAQUE_THRESHOLD"));
        assert!(lib.blended_discard.body.contains("color.a <= 0.0"));
    }

    #[test]
    fn libraries_do_not_share_instances() {
        let a = SnippetLibrary::new();
        let b = SnippetLibrary::new();
        assert!(!Arc::ptr_eq(&a.premultiply, &b.premultiply));
    }
}
