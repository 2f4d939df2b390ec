//! Contract for the user-supplied tag processing logic.

use crate::element::OsmElement;
use crate::Error;

/// Hooks invoked by the ingestion driver, one element at a time.
///
/// `way` receives both ways and multipolygon relations; the element's
/// [`kind`](crate::element::OsmElement::kind) distinguishes them. Errors
/// returned from any hook abort the run.
pub trait TagProcessor {
    /// Called once before the first input file.
    fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Tag keys that make a node worth processing. Nodes carrying none of
    /// these are stored for geometry but never shown to the processor.
    fn node_keys(&self) -> Vec<String>;

    fn node(&mut self, element: &mut OsmElement<'_>) -> Result<(), Error>;

    fn way(&mut self, element: &mut OsmElement<'_>) -> Result<(), Error>;

    /// Called once after the last tile is written.
    fn exit(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
