//! Body template catalog.
//!
//! Fusion combines the stylized face with one of these templates. The catalog
//! is static; unknown identifiers are the fusion stage's to reject.

use serde::Serialize;

/// Physical dimensions of a template in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemplateDimensions {
	pub height: u32,
	pub width: u32,
	pub depth: u32,
}

/// A body template that fusion can attach a face to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BodyTemplate {
	pub id: &'static str,
	pub name: &'static str,
	pub description: &'static str,
	pub style: &'static str,
	pub dimensions: TemplateDimensions,
}

static TEMPLATES: [BodyTemplate; 3] = [
	BodyTemplate {
		id: "default",
		name: "Default Figurine",
		description: "Standard cartoon figurine template",
		style: "classic",
		dimensions: TemplateDimensions {
			height: 180,
			width: 60,
			depth: 40,
		},
	},
	BodyTemplate {
		id: "superhero",
		name: "Superhero Pose",
		description: "Dynamic superhero stance template",
		style: "dynamic",
		dimensions: TemplateDimensions {
			height: 190,
			width: 65,
			depth: 45,
		},
	},
	BodyTemplate {
		id: "casual",
		name: "Casual Stance",
		description: "Relaxed everyday pose template",
		style: "relaxed",
		dimensions: TemplateDimensions {
			height: 175,
			width: 58,
			depth: 38,
		},
	},
];

/// Returns every known body template.
pub fn body_templates() -> &'static [BodyTemplate] {
	&TEMPLATES
}

/// Looks up a body template by identifier.
pub fn body_template(id: &str) -> Option<&'static BodyTemplate> {
	TEMPLATES.iter().find(|template| template.id == id)
}
