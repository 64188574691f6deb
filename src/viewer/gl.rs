use std::sync::Arc;

use glow::{Context, HasContext as _};
use nalgebra::Matrix4;

use super::geometry::MeshGeometry;
use super::handle::RenderBackend;
use crate::error::ViewerError;

const VERTEX_SHADER: &str = r#"#version 300 es
    precision highp float;
    uniform mat4 u_mvp;
    layout(location = 0) in vec3 a_pos;
    layout(location = 1) in vec3 a_normal;
    out vec3 v_normal;
    void main() {
        v_normal    = a_normal;
        gl_Position = u_mvp * vec4(a_pos, 1.0);
    }"#;

const FRAGMENT_SHADER: &str = r#"#version 300 es
    precision mediump float;
    uniform vec3 u_color;
    in  vec3 v_normal;
    out vec4 o_col;
    void main() {
        vec3 light = normalize(vec3(0.4, -0.6, 0.7));
        float diffuse = abs(dot(normalize(v_normal), light));
        o_col = vec4(u_color * (0.35 + 0.65 * diffuse), 1.0);
    }"#;

/// Triangle mesh resident on the GPU.
pub struct GpuMesh {
    program: glow::Program,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    vertex_count: i32,
    u_mvp: Option<glow::UniformLocation>,
    u_color: Option<glow::UniformLocation>,
}

unsafe impl Send for GpuMesh {}
unsafe impl Sync for GpuMesh {}

impl GpuMesh {
    pub unsafe fn new(gl: &Context) -> Result<Self, String> {
        unsafe {
            let program = gl.create_program()?;
            let mut shaders = Vec::with_capacity(2);
            for (kind, source) in [
                (glow::VERTEX_SHADER, VERTEX_SHADER),
                (glow::FRAGMENT_SHADER, FRAGMENT_SHADER),
            ] {
                let shader = gl.create_shader(kind)?;
                gl.shader_source(shader, source);
                gl.compile_shader(shader);
                if !gl.get_shader_compile_status(shader) {
                    let info = gl.get_shader_info_log(shader);
                    gl.delete_shader(shader);
                    gl.delete_program(program);
                    return Err(info);
                }
                gl.attach_shader(program, shader);
                shaders.push(shader);
            }
            gl.link_program(program);
            for shader in shaders {
                gl.detach_shader(program, shader);
                gl.delete_shader(shader);
            }
            if !gl.get_program_link_status(program) {
                let info = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(info);
            }

            let vao = gl.create_vertex_array()?;
            let vbo = gl.create_buffer()?;
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, 24, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 3, glow::FLOAT, false, 24, 12);
            gl.bind_vertex_array(None);

            let u_mvp = gl.get_uniform_location(program, "u_mvp");
            let u_color = gl.get_uniform_location(program, "u_color");

            Ok(Self {
                program,
                vao,
                vbo,
                vertex_count: 0,
                u_mvp,
                u_color,
            })
        }
    }

    pub unsafe fn upload_vertices(&mut self, gl: &Context, verts: &[f32]) {
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(verts),
                glow::STATIC_DRAW,
            );
        }
        // 6 floats per vertex: xyz + normal
        self.vertex_count = (verts.len() / 6) as i32;
    }

    pub unsafe fn paint(&self, gl: &Context, mvp: &Matrix4<f32>, color: [f32; 3]) {
        unsafe {
            gl.enable(glow::DEPTH_TEST);
            gl.clear(glow::DEPTH_BUFFER_BIT);
            gl.use_program(Some(self.program));
            gl.uniform_matrix_4_f32_slice(self.u_mvp.as_ref(), false, mvp.as_slice());
            gl.uniform_3_f32(self.u_color.as_ref(), color[0], color[1], color[2]);
            gl.bind_vertex_array(Some(self.vao));
            gl.draw_arrays(glow::TRIANGLES, 0, self.vertex_count);
            gl.bind_vertex_array(None);
            gl.disable(glow::DEPTH_TEST);
        }
    }

    pub unsafe fn destroy(&self, gl: &Context) {
        unsafe {
            gl.delete_buffer(self.vbo);
            gl.delete_vertex_array(self.vao);
            gl.delete_program(self.program);
        }
    }
}

/// `RenderBackend` over egui's shared glow context.
pub struct GlowBackend {
    gl: Option<Arc<Context>>,
    mesh: Option<Arc<GpuMesh>>,
    attached: bool,
    pub color: [f32; 3],
}

impl GlowBackend {
    pub fn new(gl: Arc<Context>) -> Self {
        Self {
            gl: Some(gl),
            mesh: None,
            attached: true,
            color: [0.93, 0.55, 0.18],
        }
    }

    /// A paint callback drawing the mesh into `rect`, if one is uploaded.
    pub fn paint_callback(&self, rect: egui::Rect, mvp: Matrix4<f32>) -> Option<egui::PaintCallback> {
        if !self.attached {
            return None;
        }
        let mesh = Arc::clone(self.mesh.as_ref()?);
        let color = self.color;
        let callback = egui_glow::CallbackFn::new(move |_info, painter| unsafe {
            mesh.paint(painter.gl(), &mvp, color);
        });
        Some(egui::PaintCallback {
            rect,
            callback: Arc::new(callback),
        })
    }
}

impl RenderBackend for GlowBackend {
    fn upload(&mut self, mesh: &MeshGeometry) -> Result<(), ViewerError> {
        let gl = self
            .gl
            .clone()
            .ok_or_else(|| ViewerError::Gpu("rendering context already released".into()))?;

        if self.mesh.is_none() {
            let created = unsafe { GpuMesh::new(&gl) }.map_err(ViewerError::Gpu)?;
            self.mesh = Some(Arc::new(created));
        }

        let verts = mesh.flat_shaded_vertices();
        // Upload only while we hold the single strong reference; a paint
        // callback from the previous frame may still own a clone.
        match self.mesh.as_mut().and_then(Arc::get_mut) {
            Some(gpu) => unsafe { gpu.upload_vertices(&gl, &verts) },
            None => {
                let mut fresh = unsafe { GpuMesh::new(&gl) }.map_err(ViewerError::Gpu)?;
                unsafe { fresh.upload_vertices(&gl, &verts) };
                if let Some(old) = self.mesh.replace(Arc::new(fresh)) {
                    unsafe { old.destroy(&gl) };
                }
            }
        }
        Ok(())
    }

    fn release_geometry(&mut self) {
        if let (Some(mesh), Some(gl)) = (self.mesh.take(), self.gl.as_ref()) {
            unsafe { mesh.destroy(gl) };
        }
    }

    fn release_context(&mut self) {
        self.gl = None;
    }

    fn surface_attached(&self) -> bool {
        self.attached
    }

    fn detach_surface(&mut self) {
        self.attached = false;
    }
}
