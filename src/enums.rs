use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Axial,
    Sagittal,
    Coronal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Sagittal,
        Orientation::Coronal,
    ];

    /// Identifier used when creating the viewport on the rendering engine
    pub fn viewport_id(&self) -> &'static str {
        match self {
            Orientation::Axial => "AXIAL",
            Orientation::Sagittal => "SAGITTAL",
            Orientation::Coronal => "CORONAL",
        }
    }

    /// Only the axial viewport holds a scrollable stack. Sagittal and
    /// coronal show the middle slice and are not reformatted planes.
    pub fn is_navigable(&self) -> bool {
        matches!(self, Orientation::Axial)
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.viewport_id())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PhotometricInterpretation {
    Monochrome1,
    #[default]
    Monochrome2,
    Rgb,
    Other(String),
}

impl PhotometricInterpretation {
    pub fn from_tag_value(value: &str) -> Self {
        match value.trim_matches(|c: char| c == '\0' || c.is_whitespace()) {
            "" | "MONOCHROME2" => PhotometricInterpretation::Monochrome2,
            "MONOCHROME1" => PhotometricInterpretation::Monochrome1,
            "RGB" => PhotometricInterpretation::Rgb,
            other => PhotometricInterpretation::Other(other.to_string()),
        }
    }

    /// Low values render white
    pub fn is_inverted(&self) -> bool {
        matches!(self, PhotometricInterpretation::Monochrome1)
    }
}

/// Which part of the window a histogram drag is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Min,
    Max,
    Center,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresetKind {
    Lung,
    Bone,
    Brain,
    SoftTissue,
    Liver,
    Mediastinum,
    #[default]
    Default,
    /// Set by any interactive histogram edit
    Custom,
}

impl PresetKind {
    /// Unknown names resolve to [`PresetKind::Default`].
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "lung" => PresetKind::Lung,
            "bone" => PresetKind::Bone,
            "brain" => PresetKind::Brain,
            "softtissue" => PresetKind::SoftTissue,
            "liver" => PresetKind::Liver,
            "mediastinum" => PresetKind::Mediastinum,
            _ => PresetKind::Default,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PresetKind::Lung => "lung",
            PresetKind::Bone => "bone",
            PresetKind::Brain => "brain",
            PresetKind::SoftTissue => "soft-tissue",
            PresetKind::Liver => "liver",
            PresetKind::Mediastinum => "mediastinum",
            PresetKind::Default => "default",
            PresetKind::Custom => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_names_are_lenient() {
        assert_eq!(PresetKind::from_name("Soft_Tissue"), PresetKind::SoftTissue);
        assert_eq!(PresetKind::from_name(" BONE "), PresetKind::Bone);
        assert_eq!(PresetKind::from_name("auto"), PresetKind::Default);
        assert_eq!(PresetKind::from_name("pelvis"), PresetKind::Default);
    }

    #[test]
    fn photometric_defaults_to_monochrome2() {
        assert_eq!(
            PhotometricInterpretation::from_tag_value(""),
            PhotometricInterpretation::Monochrome2
        );
        assert!(PhotometricInterpretation::from_tag_value("MONOCHROME1 ").is_inverted());
    }
}
