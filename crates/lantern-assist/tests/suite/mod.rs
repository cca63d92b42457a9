
mod imports;
mod inspections;
mod invalidation;
mod session;
