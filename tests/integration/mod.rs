mod helpers;
mod test_plan;
mod test_run;
