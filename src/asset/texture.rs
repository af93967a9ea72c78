use std::sync::{Mutex, PoisonError};

/// GPU residency settings the texture arena reads when it creates the
/// device-side texture for an [`ArenaTexture`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturePolicy {
    pub compress: bool,
    pub mipmap: bool,
    pub max_anisotropy: f32,
    pub format: Option<wgpu::TextureFormat>,
}

impl Default for TexturePolicy {
    fn default() -> Self {
        Self {
            compress: true,
            mipmap: true,
            max_anisotropy: 4.0,
            format: None,
        }
    }
}

/// What a sampler slot feeds in the terrain shader. Decides the policy
/// stamped on a texture when it is first resolved through the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerRole {
    Color,
    ColorParent,
    Elevation,
    Normal,
    LandCover,
    Shared,
}

impl SamplerRole {
    /// Applies this role's fixed policy on top of `policy`. Color slots keep
    /// whatever the producer configured.
    pub fn stamp(self, policy: &mut TexturePolicy) {
        match self {
            SamplerRole::Color | SamplerRole::ColorParent => {}
            SamplerRole::Elevation => {
                policy.compress = false;
                policy.mipmap = false;
                policy.max_anisotropy = 1.0;
                policy.format = Some(wgpu::TextureFormat::R32Float);
            }
            SamplerRole::Normal => {
                policy.compress = false;
                policy.mipmap = true;
                policy.max_anisotropy = 1.0;
            }
            SamplerRole::LandCover => {
                policy.compress = false;
                policy.mipmap = false;
                policy.max_anisotropy = 1.0;
            }
            SamplerRole::Shared => {
                policy.compress = false;
                policy.mipmap = true;
            }
        }
    }
}

/// Opaque texture object handed to the texture arena. Identity (the `Arc`
/// allocation) is what the arena de-duplicates on.
#[derive(Debug)]
pub struct ArenaTexture {
    label: String,
    policy: Mutex<TexturePolicy>,
}

impl ArenaTexture {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_policy(label, TexturePolicy::default())
    }

    pub fn with_policy(label: impl Into<String>, policy: TexturePolicy) -> Self {
        Self {
            label: label.into(),
            policy: Mutex::new(policy),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy(&self) -> TexturePolicy {
        *self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply_role(&self, role: SamplerRole) {
        let mut policy = self.policy.lock().unwrap_or_else(PoisonError::into_inner);
        role.stamp(&mut policy);
    }
}
