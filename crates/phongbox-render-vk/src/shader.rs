// SPDX-License-Identifier: CEPL-1.0
//! Phong shader sources and their runtime compilation to SPIR-V.
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use ash::util::read_spv;
use ash::vk;
use tracing::{debug, info};

pub const VERTEX_FILE: &str = "phong.vert";
pub const FRAGMENT_FILE: &str = "phong.frag";

/// Vertex layout: binding 0, `pos` vec3 @0, `normal` vec3 @12, `color` vec4 @24.
pub const PHONG_VERT: &str = r#"#version 450

layout(set = 0, binding = 0) uniform ObjectConstants {
    mat4 world;
    mat4 world_view_proj;
    float time;
    float scale;
} obj;

layout(location = 0) in vec3 in_pos;
layout(location = 1) in vec3 in_normal;
layout(location = 2) in vec4 in_color;

layout(location = 0) out vec3 v_world_pos;
layout(location = 1) out vec3 v_normal;
layout(location = 2) out vec4 v_color;

void main() {
    vec4 local = vec4(in_pos * obj.scale, 1.0);
    v_world_pos = (obj.world * local).xyz;
    v_normal = mat3(obj.world) * in_normal;
    v_color = in_color;
    gl_Position = obj.world_view_proj * local;
}
"#;

pub const PHONG_FRAG: &str = r#"#version 450

layout(set = 1, binding = 0) uniform LightConstants {
    vec4 light_position;
    vec4 light_color;
    vec4 eye_position;
} light;

layout(location = 0) in vec3 v_world_pos;
layout(location = 1) in vec3 v_normal;
layout(location = 2) in vec4 v_color;

layout(location = 0) out vec4 out_color;

const float AMBIENT = 0.1;
const float SHININESS = 32.0;
const float SPECULAR = 0.5;

void main() {
    vec3 n = normalize(v_normal);
    vec3 l = normalize(light.light_position.xyz - v_world_pos);
    vec3 v = normalize(light.eye_position.xyz - v_world_pos);
    vec3 lc = light.light_color.rgb;
    vec3 surface = v_color.rgb;

    vec3 ambient = AMBIENT * lc * surface;
    vec3 diffuse = max(dot(n, l), 0.0) * lc * surface;
    vec3 specular = pow(max(dot(reflect(-l, n), v), 0.0), SHININESS) * lc * SPECULAR;

    out_color = vec4(ambient + diffuse + specular, 1.0);
}
"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub fn embedded() -> Self {
        Self {
            vertex: PHONG_VERT.to_owned(),
            fragment: PHONG_FRAG.to_owned(),
        }
    }

    /// Reads `phong.vert` and `phong.frag` from `dir`. Both must exist.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path)
                .with_context(|| format!("read shader {}", path.display()))
        };
        let sources = Self {
            vertex: read(VERTEX_FILE)?,
            fragment: read(FRAGMENT_FILE)?,
        };
        info!("shaders loaded from {}", dir.display());
        Ok(sources)
    }

    pub fn load(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::from_dir(dir),
            None => Ok(Self::embedded()),
        }
    }
}

/// Compiled SPIR-V words for both stages.
#[derive(Clone, Debug)]
pub struct PhongSpirv {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

pub fn compile(sources: &ShaderSources) -> Result<PhongSpirv> {
    let compiler = shaderc::Compiler::new().context("create shader compiler")?;
    let mut opts = shaderc::CompileOptions::new().context("create shader compile options")?;
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let stage = |src: &str, kind: shaderc::ShaderKind, name: &str| -> Result<Vec<u32>> {
        let artifact = compiler
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .with_context(|| format!("compile {name}"))?;
        if artifact.get_num_warnings() > 0 {
            debug!("{name}: {}", artifact.get_warning_messages());
        }
        Ok(artifact.as_binary().to_vec())
    };

    Ok(PhongSpirv {
        vertex: stage(&sources.vertex, shaderc::ShaderKind::Vertex, VERTEX_FILE)?,
        fragment: stage(&sources.fragment, shaderc::ShaderKind::Fragment, FRAGMENT_FILE)?,
    })
}

pub(crate) unsafe fn create_module(device: &ash::Device, words: &[u32]) -> Result<vk::ShaderModule> {
    // Round-trip through read_spv to validate the magic number and alignment.
    let code = read_spv(&mut Cursor::new(bytemuck::cast_slice::<u32, u8>(words)))
        .context("read_spv")?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .context("create_shader_module")
}
