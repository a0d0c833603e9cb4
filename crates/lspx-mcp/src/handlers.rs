mod diagnostics;
mod introspection;
mod navigation;
mod rename;
