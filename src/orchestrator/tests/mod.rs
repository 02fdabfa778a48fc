mod support;

mod chaos;
mod controller;
mod scenario;
