use std::fmt;

use clap::ValueEnum;

/// Feature categories with a data model and an XLSForm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum Category {
    #[default]
    Buildings,
    Amenities,
    Toilets,
    Landuse,
    Emergency,
    Shops,
    Waste,
    Water,
    Education,
    Healthcare,
}

impl Category {
    /// File stem used for the data model, the XLSForm and the XForm.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Buildings => "buildings",
            Category::Amenities => "amenities",
            Category::Toilets => "toilets",
            Category::Landuse => "landuse",
            Category::Emergency => "emergency",
            Category::Shops => "shops",
            Category::Waste => "waste",
            Category::Water => "water",
            Category::Education => "education",
            Category::Healthcare => "healthcare",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
