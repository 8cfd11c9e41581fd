use std::borrow::Cow;

use anyhow::{bail, Result};
use wgpu::naga::ShaderStage;

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        "fullscreen triangle vertex",
        Cow::Borrowed(VERTEX_SHADER_GLSL),
        ShaderStage::Vertex,
    )
}

/// Wraps ShaderToy code with the uniform prelude and compiles it as GLSL.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    source: &str,
) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        "genrec fragment",
        Cow::Owned(wrap_shadertoy_fragment(source)),
        ShaderStage::Fragment,
    )
}

fn compile_glsl(
    device: &wgpu::Device,
    label: &str,
    shader: Cow<'static, str>,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader,
            stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        bail!("{label} failed to compile: {err}");
    }
    Ok(module)
}

/// Uniform names the prelude provides; user declarations of these are
/// dropped.
const PROVIDED_UNIFORMS: [&str; 7] = [
    "iResolution",
    "iTimeDelta",
    "iTime",
    "iFrameRate",
    "iFrame",
    "iMouse",
    "iDate",
];

/// Produces a self-contained GLSL fragment shader from ShaderToy code.
///
/// Strips `#version` and the ShaderToy uniform declarations, prepends
/// [`HEADER`] and appends [`FOOTER`], which calls `mainImage`.
pub(crate) fn wrap_shadertoy_fragment(source: &str) -> String {
    let mut skipped_version = false;
    let mut sanitized = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            continue;
        }
        if trimmed.starts_with("uniform ")
            && PROVIDED_UNIFORMS.iter().any(|name| trimmed.contains(name))
        {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }

    format!("{HEADER}\n#line 1\n{sanitized}{FOOTER}")
}

/// GLSL prologue injected ahead of every fragment shader.
///
/// The block layout must match `ShadertoyUniforms` in `gpu/uniforms.rs`.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform ShaderParams {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    int _iFrame;
    float _iFrameRate;
    float _iSampleRate;
    vec4 _iMouse;
    vec4 _iDate;
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrame ubo._iFrame
#define iFrameRate ubo._iFrameRate
#define iSampleRate ubo._iSampleRate
#define iMouse ubo._iMouse
#define iDate ubo._iDate

vec4 genrec_gl_FragCoord;
#define gl_FragCoord genrec_gl_FragCoord
";

/// Remaps to ShaderToy's bottom-left origin and writes an opaque colour.
const FOOTER: &str = r"void main() {
    #undef gl_FragCoord
    vec2 builtinFC = vec2(gl_FragCoord.x, gl_FragCoord.y);
    #define gl_FragCoord genrec_gl_FragCoord

    vec2 fragCoord = vec2(builtinFC.x, iResolution.y - builtinFC.y);
    genrec_gl_FragCoord = vec4(fragCoord, 0.0, 1.0);

    vec4 color = vec4(0.0);
    mainImage(color, fragCoord);
    outColor = vec4(clamp(color.rgb, 0.0, 1.0), 1.0);
}
";

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Built-in pattern used when no shader file is configured.
///
/// A hand sweeps one revolution per simulated second and a bar crosses the
/// frame every two, so dropped or doubled frames show up in the output.
pub const DEMO_SHADER: &str = r"void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;
    vec2 p = (fragCoord - 0.5 * iResolution.xy) / iResolution.y;

    vec3 col = 0.5 + 0.5 * cos(iTime * 0.5 + uv.xyx + vec3(0.0, 2.0, 4.0));
    col *= 0.35;

    float angle = 6.2831853 * fract(iTime);
    vec2 hand = vec2(sin(angle), cos(angle));
    float along = dot(p, hand);
    float across = abs(p.x * hand.y - p.y * hand.x);
    if (along > 0.0 && along < 0.4 && across < 0.01) {
        col = vec3(1.0);
    }
    float ring = abs(length(p) - 0.42);
    col = mix(col, vec3(0.9), smoothstep(0.006, 0.0, ring));

    float bar = fract(iTime * 0.5);
    if (abs(uv.x - bar) < 0.004) {
        col = vec3(1.0, 0.3, 0.2);
    }
    if (mod(float(iFrame), 2.0) < 1.0 && uv.y < 0.02 && uv.x < 0.02) {
        col = vec3(0.2, 1.0, 0.3);
    }
    fragColor = vec4(col, 1.0);
}
";
